use thiserror::Error;

/// Raised when a typed identifier or credential is built from bad input.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{kind} cannot be empty")]
    Empty { kind: &'static str },

    #[error("Invalid relay url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
}
