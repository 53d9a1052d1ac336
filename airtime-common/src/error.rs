//! Common error types for Airtime

use thiserror::Error;

/// Common result type for Airtime operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across Airtime services
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Message payload could not be decoded
    #[error("Invalid message: {0}")]
    InvalidMessage(#[from] serde_json::Error),

    /// Invalid input (malformed interval, empty update, ...)
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
