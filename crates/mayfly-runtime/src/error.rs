//! Error types for the container runtime

use std::time::Duration;
use thiserror::Error;

/// Error type for container operations
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Image could not be pulled and is not present locally
    #[error("failed to pull image {image}: {message}")]
    Pull { image: String, message: String },

    /// Container creation failed
    #[error("failed to create container from {image}: {message}")]
    Create { image: String, message: String },

    /// Container start failed
    #[error("failed to start container {id}: {message}")]
    Start { id: String, message: String },

    /// Container state could not be read
    #[error("failed to inspect container {id}: {message}")]
    Inspect { id: String, message: String },

    /// Waiting for the container to stop failed
    #[error("failed waiting for container {id}: {message}")]
    Wait { id: String, message: String },

    /// Container removal failed
    #[error("failed to remove container {id}: {message}")]
    Remove { id: String, message: String },

    /// The bounding timeout elapsed before the container stopped
    #[error("container timed out after {0:?}")]
    Timeout(Duration),

    /// Shutdown was requested while the container ran. The container has
    /// been removed.
    #[error("interrupted by shutdown")]
    Cancelled,

    /// Log streaming failed
    #[error("log streaming failed: {0}")]
    Logs(String),

    /// Registry login failed
    #[error("registry login failed for {registry}: {message}")]
    Login { registry: String, message: String },

    /// I/O error talking to the runtime
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RuntimeError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, RuntimeError::Timeout(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, RuntimeError::Cancelled)
    }
}

/// Result type for runtime operations
pub type Result<T> = std::result::Result<T, RuntimeError>;
