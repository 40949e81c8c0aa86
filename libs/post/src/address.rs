//! Network addresses for protocol participants.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use thiserror::Error;

/// The handle used to send a message to a protocol participant.
///
/// An address is cheap to clone and compare; its canonical string form is
/// `name@ip:port`, e.g. `master@10.0.0.1:5050`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address {
    /// Logical name of the participant (unique per host/port).
    pub name: String,

    /// IPv4 address of the host.
    pub ip: Ipv4Addr,

    /// Port the participant listens on.
    pub port: u16,
}

impl Address {
    /// Creates an address from its parts.
    pub fn new(name: impl Into<String>, ip: Ipv4Addr, port: u16) -> Self {
        Self {
            name: name.into(),
            ip,
            port,
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.name, self.ip, self.port)
    }
}

/// Errors from parsing an address string.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AddressParseError {
    #[error("address missing '@' separator: {0:?}")]
    MissingAt(String),

    #[error("address missing ':' port separator: {0:?}")]
    MissingPort(String),

    #[error("address has empty name: {0:?}")]
    EmptyName(String),

    #[error("invalid ip in address: {0}")]
    InvalidIp(String),

    #[error("invalid port in address: {0}")]
    InvalidPort(String),
}

impl FromStr for Address {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, rest) = s
            .split_once('@')
            .ok_or_else(|| AddressParseError::MissingAt(s.to_string()))?;
        if name.is_empty() {
            return Err(AddressParseError::EmptyName(s.to_string()));
        }
        let (ip, port) = rest
            .rsplit_once(':')
            .ok_or_else(|| AddressParseError::MissingPort(s.to_string()))?;
        let ip = ip
            .parse::<Ipv4Addr>()
            .map_err(|e| AddressParseError::InvalidIp(e.to_string()))?;
        let port = port
            .parse::<u16>()
            .map_err(|e| AddressParseError::InvalidPort(e.to_string()))?;
        Ok(Self::new(name, ip, port))
    }
}

impl serde::Serialize for Address {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> serde::Deserialize<'de> for Address {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
