//! Error types for the Tandem engine.

use crate::{AttachmentId, RecordId};
use thiserror::Error;

/// All possible errors from the Tandem engine.
///
/// Resolution failures are reported per record in
/// [`SyncResult::conflicts`](crate::SyncResult), not here.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    // Validation errors
    #[error("missing device id")]
    MissingDeviceId,

    #[error("missing credential")]
    MissingCredential,

    #[error("invalid credential")]
    InvalidCredential,

    // Lookup errors
    #[error("attachment not found: {0}")]
    AttachmentNotFound(AttachmentId),

    #[error("record not found: {0}")]
    RecordNotFound(RecordId),

    // Adapter errors
    #[error("storage error: {0}")]
    Storage(String),
}

impl Error {
    /// Wrap any adapter-level failure.
    pub fn storage(err: impl std::fmt::Display) -> Self {
        Error::Storage(err.to_string())
    }

    /// Whether this error was raised before any adapter call was made.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::MissingDeviceId | Error::MissingCredential | Error::InvalidCredential
        )
    }

    /// Whether this error is a lookup miss rather than a failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::AttachmentNotFound(_) | Error::RecordNotFound(_))
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = Error::AttachmentNotFound("att-1".into());
        assert_eq!(err.to_string(), "attachment not found: att-1");

        let err = Error::storage("connection reset");
        assert_eq!(err.to_string(), "storage error: connection reset");

        assert_eq!(Error::MissingDeviceId.to_string(), "missing device id");
    }

    #[test]
    fn error_classes() {
        assert!(Error::MissingCredential.is_validation());
        assert!(Error::InvalidCredential.is_validation());
        assert!(!Error::Storage("x".into()).is_validation());

        assert!(Error::AttachmentNotFound("a".into()).is_not_found());
        assert!(!Error::MissingDeviceId.is_not_found());
    }
}
