//! Error types for CRD operations

use thiserror::Error;

/// Errors that can occur when working with CRDs
#[derive(Debug, Error)]
pub enum CrdError {
    /// Missing required field
    #[error("Missing required field: {0}")]
    MissingField(String),

    /// Invalid field value
    #[error("Invalid value for field '{field}': {message}")]
    InvalidFieldValue { field: String, message: String },

    /// A state name or code with no matching variant
    #[error("Unknown state: {0}")]
    UnknownState(String),

    /// Object written with an apiVersion we cannot convert
    #[error("Unsupported apiVersion: {0}")]
    UnsupportedApiVersion(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Result type for CRD operations
pub type Result<T> = std::result::Result<T, CrdError>;
