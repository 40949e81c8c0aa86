//! Resource vectors and their algebra.

use std::fmt;
use std::ops::{Add, AddAssign, Sub, SubAssign};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A fixed-schema resource quantity: CPU cores and memory bytes.
///
/// Addition and subtraction are componentwise. A vector `a` dominates
/// `b` iff every component of `a` is at least the corresponding
/// component of `b`; dominance is the admission test everywhere a
/// resource budget is enforced.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct ResourceVector {
    /// CPU cores (fractional allowed).
    pub cpu: f64,

    /// Memory in bytes.
    pub mem: u64,
}

impl ResourceVector {
    /// The empty vector.
    pub const ZERO: Self = Self { cpu: 0.0, mem: 0 };

    /// Creates a vector from its components.
    pub const fn new(cpu: f64, mem: u64) -> Self {
        Self { cpu, mem }
    }

    /// True iff every component of `self` is ≥ the corresponding
    /// component of `other`.
    pub fn dominates(&self, other: &Self) -> bool {
        self.cpu >= other.cpu && self.mem >= other.mem
    }

    /// True iff both components are zero.
    pub fn is_zero(&self) -> bool {
        self.cpu == 0.0 && self.mem == 0
    }
}

impl Add for ResourceVector {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            cpu: self.cpu + rhs.cpu,
            mem: self.mem + rhs.mem,
        }
    }
}

impl AddAssign for ResourceVector {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Sub for ResourceVector {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self {
            cpu: (self.cpu - rhs.cpu).max(0.0),
            mem: self.mem.saturating_sub(rhs.mem),
        }
    }
}

impl SubAssign for ResourceVector {
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}

impl fmt::Display for ResourceVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cpu:{};mem:{}", self.cpu, self.mem)
    }
}

/// Errors from parsing the `cpu:<n>;mem:<bytes>` syntax.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResourceParseError {
    #[error("malformed resource component: {0:?}")]
    Malformed(String),

    #[error("unknown resource name: {0:?}")]
    UnknownName(String),

    #[error("invalid value for {name}: {value:?}")]
    InvalidValue { name: &'static str, value: String },

    #[error("duplicate resource name: {0:?}")]
    Duplicate(String),
}

impl FromStr for ResourceVector {
    type Err = ResourceParseError;

    /// Parses `cpu:<n>;mem:<bytes>`. Components may appear in either
    /// order; an omitted component is zero.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut cpu: Option<f64> = None;
        let mut mem: Option<u64> = None;

        for part in s.split(';').filter(|p| !p.is_empty()) {
            let (name, value) = part
                .split_once(':')
                .ok_or_else(|| ResourceParseError::Malformed(part.to_string()))?;
            match name.trim() {
                "cpu" => {
                    if cpu.is_some() {
                        return Err(ResourceParseError::Duplicate("cpu".to_string()));
                    }
                    let v: f64 = value.trim().parse().map_err(|_| {
                        ResourceParseError::InvalidValue {
                            name: "cpu",
                            value: value.to_string(),
                        }
                    })?;
                    if v < 0.0 || !v.is_finite() {
                        return Err(ResourceParseError::InvalidValue {
                            name: "cpu",
                            value: value.to_string(),
                        });
                    }
                    cpu = Some(v);
                }
                "mem" => {
                    if mem.is_some() {
                        return Err(ResourceParseError::Duplicate("mem".to_string()));
                    }
                    let v: u64 = value.trim().parse().map_err(|_| {
                        ResourceParseError::InvalidValue {
                            name: "mem",
                            value: value.to_string(),
                        }
                    })?;
                    mem = Some(v);
                }
                other => return Err(ResourceParseError::UnknownName(other.to_string())),
            }
        }

        Ok(Self {
            cpu: cpu.unwrap_or(0.0),
            mem: mem.unwrap_or(0),
        })
    }
}
