//! Storage error types.

use thiserror::Error;

/// Errors from storage backends.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Stored bytes could not be encoded or decoded
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error (file system, database, etc.)
    #[error("I/O error: {0}")]
    Io(String),
}

impl StorageError {
    /// Returns true if retrying the same operation may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Io(_))
    }
}
