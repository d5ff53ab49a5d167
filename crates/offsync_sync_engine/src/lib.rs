//! # OffSync Sync Engine
//!
//! Offline-first synchronization for OffSync.
//!
//! This crate provides:
//! - Local-first saves with a durable change log
//! - Connectivity monitoring against the remote's health route
//! - Ordered, per-entity delivery with exponential backoff
//! - Conflict detection and resolution (last-write-wins by default)
//! - Backup and restore of the local store
//! - HTTP transport abstraction
//!
//! ## Architecture
//!
//! ```text
//! save/delete ──► DocumentStore ──► ChangeLog ──► sync pass ──► RemoteEndpoint
//!                                       ▲              │
//!                                       │              ▼ 409
//!                                  requeue ◄── ConflictLog / policy
//! ```
//!
//! The connectivity monitor probes the remote on an interval and starts a
//! full sync pass whenever the remote becomes reachable again.
//!
//! ## Key Invariants
//!
//! - The local store is written before anything is queued
//! - Changes of one entity are delivered in the order they were made
//! - A change leaves the queue only when accepted or discarded by a
//!   remote-wins resolution
//! - Conflict records are never deleted and are resolved at most once

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod conflicts;
mod engine;
mod error;
mod http;
mod monitor;
mod queue;
mod transport;

pub use config::{RetryConfig, SyncConfig, DEFAULT_SYNC_DIR};
pub use conflicts::{ConflictLog, CONFLICTS_FILE};
pub use engine::{ChangeOutcome, ResolutionOutcome, SyncEngine, SyncReport, SyncStatus};
pub use error::{SyncError, SyncResult};
pub use http::HttpTransport;
pub use monitor::{Connectivity, MonitorHandle, Transition};
pub use queue::{ChangeLog, QUEUE_FILE};
pub use transport::{MockRemote, MockReply, RemoteEndpoint, RemoteResponse};
