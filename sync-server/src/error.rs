//! Error types for fieldsync-server.

use std::path::PathBuf;
use sync_types::SyncError;

/// Main error type for server operations.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Request rejected by the engines (validation, not found, ...).
    #[error(transparent)]
    Request(#[from] SyncError),

    /// Storage error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Rate limit exceeded.
    #[error("rate limit exceeded: {reason}")]
    RateLimited {
        /// Reason for rate limiting.
        reason: String,
    },
}

impl From<sync_core::ScopeError> for ServerError {
    fn from(err: sync_core::ScopeError) -> Self {
        Self::Request(err.into())
    }
}

impl From<sync_core::CursorError> for ServerError {
    fn from(err: sync_core::CursorError) -> Self {
        Self::Request(err.into())
    }
}

impl From<sync_core::LinkageError> for ServerError {
    fn from(err: sync_core::LinkageError) -> Self {
        Self::Request(err.into())
    }
}

/// Storage layer errors.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Database error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A stored value could not be decoded.
    #[error("corrupt {column} in row {row}: {reason}")]
    Corrupt {
        /// Column holding the bad value.
        column: &'static str,
        /// Row identifier.
        row: String,
        /// What was wrong.
        reason: String,
    },

    /// Payload serialization failed.
    #[error("payload serialization failed: {0}")]
    Payload(#[from] serde_json::Error),

    /// Database path error.
    #[error("invalid database path: {path}")]
    InvalidPath {
        /// The invalid path.
        path: PathBuf,
    },
}

/// Result type alias for server operations.
pub type Result<T> = std::result::Result<T, ServerError>;

/// Result type alias for storage operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;
