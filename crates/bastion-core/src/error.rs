//! Error types for bastion-core.

use thiserror::Error;

/// Core error types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("Unknown {taxonomy} variant: {value}")]
    UnknownVariant { taxonomy: &'static str, value: String },

    #[error("Invalid digest: {0}")]
    InvalidDigest(String),

    #[error("Invalid identifier: {0}")]
    InvalidId(String),

    #[error("Invalid snapshot: {0}")]
    InvalidSnapshot(String),

    #[error("Serialization failed: {0}")]
    Serialization(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
