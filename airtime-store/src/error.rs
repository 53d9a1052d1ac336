//! Error types for airtime-store
//!
//! The taxonomy mirrors how failures are handled at the message-processing
//! boundary: `Write` and `Recoverable` cause redelivery, `MissingResource`
//! drops the affected entry from a result, `Timeout` is always a recorded
//! failure.

use std::time::Duration;

use airtime_common::model::Id;
use thiserror::Error;

/// Main error type for airtime-store
#[derive(Error, Debug)]
pub enum Error {
    /// Persistence failure on a schedule/content/graph write. Propagated to
    /// the caller; at the messaging layer this triggers redelivery.
    #[error("Write failed: {0}")]
    Write(String),

    /// Database connection or query errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Transient failure; the whole message is safe to retry.
    #[error("Recoverable failure: {0}")]
    Recoverable(String),

    /// A referenced id is absent from the backing store.
    #[error("Missing resource: {0}")]
    MissingResource(Id),

    /// A bounded external call exceeded its deadline.
    #[error("Timed out after {0:?}: {1}")]
    Timeout(Duration, String),

    /// Sending an update message failed.
    #[error("Messaging error: {0}")]
    Messaging(String),

    /// Stored payload could not be decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid request
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl Error {
    /// Whether redelivering the originating message may succeed.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::Write(_) | Error::Database(_) | Error::Recoverable(_) | Error::Timeout(..)
        )
    }
}

/// Convenience Result type using airtime-store Error
pub type Result<T> = std::result::Result<T, Error>;
