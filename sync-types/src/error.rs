//! Error taxonomy shared by the sync and matching engines.

use thiserror::Error;

/// Errors surfaced to callers of the sync and matching operations.
///
/// Biometric matcher faults are deliberately absent: they are absorbed by
/// the matcher and never reach a caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    /// Malformed or incomplete request (missing country, non-positive limit, no search key).
    #[error("validation failed: {0}")]
    Validation(String),

    /// Scope resolves to nothing, or a referenced location/device does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Reserved for callers; never produced by the engines.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A payload or identifier could not be decoded.
    #[error("invalid data: {0}")]
    InvalidData(String),
}

impl SyncError {
    /// Stable machine-readable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::InvalidData(_) => "invalid_data",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = SyncError::Validation("limit must be positive".into());
        assert_eq!(err.to_string(), "validation failed: limit must be positive");
    }

    #[test]
    fn error_kind_names() {
        assert_eq!(SyncError::NotFound("x".into()).kind(), "not_found");
        assert_eq!(SyncError::Conflict("x".into()).kind(), "conflict");
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SyncError>();
    }
}
