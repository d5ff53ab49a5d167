//! Error types for protocol values.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while building or transitioning protocol values.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// A resolution string was not recognised.
    #[error("invalid conflict resolution {0:?} (expected local_wins or remote_wins)")]
    InvalidResolution(String),

    /// A policy string was not recognised.
    #[error("invalid conflict policy {0:?}")]
    InvalidPolicy(String),

    /// The conflict already carries a resolution.
    #[error("conflict {0} is already resolved")]
    AlreadyResolved(String),
}
