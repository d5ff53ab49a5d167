//! # OffSync Storage
//!
//! Durable local persistence for OffSync.
//!
//! This crate provides the lowest layer of the offline-first stack: one
//! JSON document per `(entity_type, entity_id)`, and whole-store backups.
//! Stores are **opaque document stores** - they do not know about change
//! tracking, sync state or conflicts.
//!
//! ## Design Principles
//!
//! - Writes are crash-safe (temp file, fsync, rename, directory fsync)
//! - One process owns a store directory at a time (advisory `LOCK` file)
//! - Must be `Send + Sync` for concurrent access
//!
//! ## Available Stores
//!
//! - [`FileStore`] - For persistent storage on the local filesystem
//! - [`InMemoryStore`] - For testing and ephemeral storage
//!
//! ## Example
//!
//! ```rust
//! use offsync_storage::{DocumentStore, InMemoryStore};
//! use serde_json::json;
//!
//! let store = InMemoryStore::new();
//! store.save("note", "n1", &json!({"text": "hello"})).unwrap();
//! assert_eq!(store.load("note", "n1").unwrap(), Some(json!({"text": "hello"})));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod atomic;
mod backup;
mod error;
mod file;
mod memory;
mod store;

pub use atomic::{sync_directory, write_atomic};
pub use backup::{BackupInfo, BackupManager, RestoreReport};
pub use error::{StorageError, StorageResult};
pub use file::FileStore;
pub use memory::InMemoryStore;
pub use store::{validate_name, DocumentStore, MAX_NAME_LEN};
