//! Error types for boostmdp

use thiserror::Error;

/// Main error type for boostmdp
#[derive(Error, Debug)]
pub enum BoostError {
    /// Missing or out-of-range configuration; raised before any episode runs.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Driver and model disagree (unknown action, step index out of range...).
    #[error("Domain error: {0}")]
    Domain(String),

    /// Malformed serialized Q-function or vote table.
    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BoostError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn domain(msg: impl Into<String>) -> Self {
        Self::Domain(msg.into())
    }

    pub fn persistence(msg: impl Into<String>) -> Self {
        Self::Persistence(msg.into())
    }
}

/// Result type alias for boostmdp operations
pub type Result<T> = std::result::Result<T, BoostError>;
