//! Error types for storage operations.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A document could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An entity type or entity id is not usable as a storage key.
    #[error("invalid {kind} name {name:?}: {reason}")]
    InvalidName {
        /// Which identifier was rejected ("entity type" or "entity id").
        kind: &'static str,
        /// The rejected value.
        name: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// Another process holds the store lock.
    #[error("store locked: another process has exclusive access to {0}")]
    Locked(PathBuf),

    /// A stored document is unreadable.
    #[error("document corrupted at {path}: {message}")]
    Corrupted {
        /// Path of the offending file.
        path: PathBuf,
        /// Description of the problem.
        message: String,
    },

    /// A backup with this name already exists.
    #[error("backup already exists: {0}")]
    BackupExists(PathBuf),

    /// The requested backup does not exist.
    #[error("backup not found: {0}")]
    BackupNotFound(PathBuf),

    /// The backup directory is missing its manifest or is malformed.
    #[error("invalid backup at {path}: {message}")]
    InvalidBackup {
        /// Backup directory.
        path: PathBuf,
        /// Description of the problem.
        message: String,
    },
}

impl StorageError {
    /// Creates a corrupted-document error.
    pub fn corrupted(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Corrupted {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates an invalid-backup error.
    pub fn invalid_backup(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::InvalidBackup {
            path: path.into(),
            message: message.into(),
        }
    }
}
