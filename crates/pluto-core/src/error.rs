//! Error types for the Pluto counter service
//!
//! This module defines all error types used throughout the crate.

use thiserror::Error;

/// Result type alias for Pluto operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the Pluto counter service
#[derive(Error, Debug)]
pub enum Error {
    /// Device store errors (open, read, write)
    #[error("Device store error: {0}")]
    Store(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Socket and filesystem errors
    #[error("Network error: {0}")]
    Network(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Persisted timestamp could not be parsed
    #[error("Invalid timestamp: {0}")]
    Timestamp(String),

    /// Datagram payload could not be interpreted
    #[error("Malformed datagram: {0}")]
    Protocol(String),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a device store error
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a timestamp error
    pub fn timestamp(msg: impl Into<String>) -> Self {
        Self::Timestamp(msg.into())
    }

    /// Create a protocol error
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
