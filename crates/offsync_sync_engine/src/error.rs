//! Error types for the sync engine.

use offsync_storage::StorageError;
use offsync_sync_protocol::ProtocolError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Local persistence failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// A protocol value could not be built or transitioned.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// The remote did not answer in time.
    #[error("operation timed out")]
    Timeout,

    /// The remote answered with an unexpected status.
    #[error("remote rejected the request with status {status}")]
    RemoteRejected {
        /// HTTP status code.
        status: u16,
        /// Whether the status is transient.
        retryable: bool,
    },

    /// No conflict with this ID exists.
    #[error("conflict not found: {0}")]
    ConflictNotFound(String),

    /// No queued change with this ID exists.
    #[error("change not found: {0}")]
    ChangeNotFound(String),

    /// An earlier change of the same entity must be delivered first.
    #[error("change {change_id} is queued behind {blocked_by}")]
    OutOfOrder {
        /// The change that was asked for.
        change_id: String,
        /// The entity's oldest queued change.
        blocked_by: String,
    },

    /// The change is held by a conflict that has not been resolved.
    #[error("change {0} awaits conflict resolution")]
    AwaitingResolution(String),

    /// The engine configuration is unusable.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Engine state could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport { retryable, .. } => *retryable,
            SyncError::RemoteRejected { retryable, .. } => *retryable,
            SyncError::Timeout => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(SyncError::transport_retryable("connection lost").is_retryable());
        assert!(!SyncError::transport_fatal("invalid certificate").is_retryable());
        assert!(SyncError::Timeout.is_retryable());
        assert!(SyncError::RemoteRejected {
            status: 503,
            retryable: true
        }
        .is_retryable());
        assert!(!SyncError::ConflictNotFound("c1".into()).is_retryable());
    }

    #[test]
    fn error_display() {
        let err = SyncError::Timeout;
        assert_eq!(err.to_string(), "operation timed out");

        let err = SyncError::RemoteRejected {
            status: 422,
            retryable: false,
        };
        assert!(err.to_string().contains("422"));

        let err: SyncError = ProtocolError::AlreadyResolved("c1".into()).into();
        assert_eq!(err.to_string(), "conflict c1 is already resolved");
    }
}
