//! Core error types shared by the binary and library crates.

use thiserror::Error;

/// Errors raised while resolving paths or loading configuration.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Path error (e.g., home directory not found)
    #[error("Path error: {0}")]
    Path(String),
}

/// Result type alias using CoreError.
pub type CoreResult<T> = Result<T, CoreError>;
