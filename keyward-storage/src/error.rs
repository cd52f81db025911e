//! Error types for the storage layer.

use crate::backend::Collection;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur in storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error (file system).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A changeset precondition no longer holds; nothing was written.
    #[error("commit conflict in {0}")]
    Conflict(Collection),

    /// Stored or imported data violates a ledger invariant.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// A thread panicked while holding the backend lock.
    #[error("storage lock poisoned")]
    Poisoned,
}

impl From<keyward_types::Error> for StorageError {
    fn from(err: keyward_types::Error) -> Self {
        Self::InvalidData(err.to_string())
    }
}
