//! Macro for defining typed id newtypes.

/// Defines a typed id wrapping an opaque string.
///
/// The generated type carries:
/// - `new()` from anything string-like (no validation, trusted callers)
/// - `parse()` with empty/whitespace rejection for untrusted input
/// - `as_str()` to borrow the raw value
/// - `Display`, `FromStr`, `Serialize`/`Deserialize` as the plain string
/// - `Eq`, `Ord`, `Hash`, `Clone`
///
/// # Example
///
/// ```ignore
/// define_id!(FrameworkId);
///
/// let fid = FrameworkId::new("201102-57496-1");
/// let parsed: FrameworkId = "201102-57496-1".parse()?;
/// assert_eq!(fid, parsed);
/// ```
#[macro_export]
macro_rules! define_id {
    ($name:ident) => {
        /// A typed id for this resource kind.
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(String);

        impl $name {
            /// Creates an id from a trusted value.
            #[must_use]
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Parses an id from an untrusted string.
            pub fn parse(s: &str) -> Result<Self, $crate::IdError> {
                if s.is_empty() {
                    return Err($crate::IdError::Empty);
                }
                if s.chars().any(|c| c.is_whitespace() || c.is_control()) {
                    return Err($crate::IdError::Invalid(s.to_string()));
                }
                Ok(Self(s.to_string()))
            }

            /// Borrows the raw id value.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = $crate::IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self::new(s)
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                serializer.serialize_str(&self.0)
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let s = String::deserialize(deserializer)?;
                Self::parse(&s).map_err(serde::de::Error::custom)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}
