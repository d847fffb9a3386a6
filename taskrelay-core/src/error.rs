//! Core error types for taskrelay

use thiserror::Error;

/// Errors raised while encoding or decoding model types
#[derive(Debug, Error)]
pub enum CoreError {
    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A record is missing a field required to identify it
    #[error("Invalid record: {0}")]
    InvalidRecord(String),
}

/// Result type alias for the core crate
pub type Result<T> = std::result::Result<T, CoreError>;
