//! Error types for id parsing.

use thiserror::Error;

/// Errors that can occur when parsing a typed id.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdError {
    /// The id string is empty.
    #[error("id cannot be empty")]
    Empty,

    /// The id string contains whitespace or control characters.
    #[error("invalid id: {0:?}")]
    Invalid(String),
}
