//! # OffSync Sync Protocol
//!
//! Sync protocol types for OffSync.
//!
//! This crate provides:
//! - [`ChangeRecord`] for queued local mutations
//! - [`ChangeQueue`] for ordering them
//! - [`ConflictRecord`] and [`ConflictPolicy`] for conflict handling
//! - Request mapping for the remote REST API
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod change;
mod conflict;
mod error;
mod hash;
mod queue;
mod wire;

pub use change::{ChangeKind, ChangeRecord, SyncState};
pub use conflict::{
    parse_timestamp, remote_timestamp, AutoDecision, ConflictPolicy, ConflictRecord,
    ConflictResolution, ResolvedBy, TIMESTAMP_FIELDS,
};
pub use error::{ProtocolError, ProtocolResult};
pub use hash::{canonical_json, content_hash};
pub use queue::ChangeQueue;
pub use wire::{
    is_retryable_status, join_url, ChangeEnvelope, RemoteMethod, RemoteOutcome, RemoteRequest,
    API_PREFIX, HEALTH_PATH,
};
