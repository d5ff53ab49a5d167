//! Change records tracked by the sync queue.

use crate::hash::content_hash;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// The kind of local mutation a change record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// A new entity was saved.
    Create,
    /// An existing entity was overwritten.
    Update,
    /// An entity was removed.
    Delete,
}

impl ChangeKind {
    /// Returns the lowercase name used on disk and in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Create => "create",
            ChangeKind::Update => "update",
            ChangeKind::Delete => "delete",
        }
    }

    /// Returns true if records of this kind carry a payload.
    pub fn has_payload(&self) -> bool {
        !matches!(self, ChangeKind::Delete)
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Delivery state of a change record.
///
/// ```text
/// Pending -> Syncing -> Synced
///                    -> Conflict -> (resolved) Pending | discarded
///                    -> Failed   -> (retry) Syncing
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    /// Waiting to be sent.
    Pending,
    /// Currently being sent.
    Syncing,
    /// Accepted by the remote.
    Synced,
    /// The remote rejected the change with a conflict.
    Conflict,
    /// Delivery failed and will be retried.
    Failed,
}

impl SyncState {
    /// Returns the lowercase name used on disk and in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncState::Pending => "pending",
            SyncState::Syncing => "syncing",
            SyncState::Synced => "synced",
            SyncState::Conflict => "conflict",
            SyncState::Failed => "failed",
        }
    }

    /// Returns true if a sync pass may attempt delivery in this state.
    pub fn is_sendable(&self) -> bool {
        matches!(self, SyncState::Pending | SyncState::Failed)
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single local mutation awaiting delivery.
///
/// `created_at` is fixed when the record is built; only the delivery
/// fields change afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
    /// Unique change ID.
    pub id: String,
    /// Entity namespace.
    pub entity_type: String,
    /// Entity ID within the namespace.
    pub entity_id: String,
    /// What happened to the entity.
    pub kind: ChangeKind,
    /// Full entity content; `null` for deletes.
    pub payload: Value,
    /// ID of the device/engine that made the change.
    pub actor_id: String,
    /// When the mutation happened locally.
    pub created_at: DateTime<Utc>,
    /// SHA-256 of the canonical payload; absent for deletes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
    /// Delivery state.
    pub state: SyncState,
    /// When the remote accepted the change.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synced_at: Option<DateTime<Utc>>,
    /// Number of failed delivery attempts.
    #[serde(default)]
    pub attempts: u32,
    /// Earliest time the next retry may run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_attempt_at: Option<DateTime<Utc>>,
    /// Message of the last delivery failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl ChangeRecord {
    /// Creates a pending change stamped with the current time.
    pub fn new(
        kind: ChangeKind,
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
        payload: Value,
        actor_id: impl Into<String>,
    ) -> Self {
        let payload = if kind.has_payload() {
            payload
        } else {
            Value::Null
        };
        let content_hash = kind.has_payload().then(|| content_hash(&payload));

        Self {
            id: uuid::Uuid::new_v4().to_string(),
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
            kind,
            payload,
            actor_id: actor_id.into(),
            created_at: Utc::now(),
            content_hash,
            state: SyncState::Pending,
            synced_at: None,
            attempts: 0,
            next_attempt_at: None,
            last_error: None,
        }
    }

    /// Creates a create change.
    pub fn create(
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
        payload: Value,
        actor_id: impl Into<String>,
    ) -> Self {
        Self::new(ChangeKind::Create, entity_type, entity_id, payload, actor_id)
    }

    /// Creates an update change.
    pub fn update(
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
        payload: Value,
        actor_id: impl Into<String>,
    ) -> Self {
        Self::new(ChangeKind::Update, entity_type, entity_id, payload, actor_id)
    }

    /// Creates a delete change.
    pub fn delete(
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
        actor_id: impl Into<String>,
    ) -> Self {
        Self::new(
            ChangeKind::Delete,
            entity_type,
            entity_id,
            Value::Null,
            actor_id,
        )
    }

    /// Overrides the creation timestamp. Only meaningful before the
    /// record is enqueued.
    #[must_use]
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    /// Returns true if this change targets the given entity.
    pub fn targets(&self, entity_type: &str, entity_id: &str) -> bool {
        self.entity_type == entity_type && self.entity_id == entity_id
    }

    /// Returns true if a sync pass at `now` may send this change.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.state.is_sendable() && self.next_attempt_at.map_or(true, |at| at <= now)
    }

    /// Returns true if `value` has the same content as this change's payload.
    pub fn content_matches(&self, value: &Value) -> bool {
        match &self.content_hash {
            Some(hash) => *hash == content_hash(value),
            None => value.is_null(),
        }
    }

    /// Marks the change as in flight.
    pub fn mark_syncing(&mut self) {
        self.state = SyncState::Syncing;
    }

    /// Marks the change as accepted by the remote.
    pub fn mark_synced(&mut self, at: DateTime<Utc>) {
        self.state = SyncState::Synced;
        self.synced_at = Some(at);
        self.next_attempt_at = None;
        self.last_error = None;
    }

    /// Records a failed attempt and schedules the next one.
    pub fn mark_failed(&mut self, error: impl Into<String>, next_attempt_at: DateTime<Utc>) {
        self.state = SyncState::Failed;
        self.attempts = self.attempts.saturating_add(1);
        self.last_error = Some(error.into());
        self.next_attempt_at = Some(next_attempt_at);
    }

    /// Marks the change as waiting on conflict resolution.
    pub fn mark_conflict(&mut self) {
        self.state = SyncState::Conflict;
        self.next_attempt_at = None;
    }

    /// Returns the change to the pending state with its backoff cleared.
    pub fn requeue(&mut self) {
        self.state = SyncState::Pending;
        self.next_attempt_at = None;
    }
}
