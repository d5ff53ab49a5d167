//! Conflict records and resolution policies.

use crate::change::ChangeRecord;
use crate::error::{ProtocolError, ProtocolResult};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Fields checked, in order, for a remote snapshot's last-modified time.
pub const TIMESTAMP_FIELDS: &[&str] = &["updated_at", "last_modified", "modified_at", "updatedAt"];

/// How a conflict was settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictResolution {
    /// Keep the local change and send it again.
    LocalWins,
    /// Adopt the remote snapshot and drop the local change.
    RemoteWins,
}

impl ConflictResolution {
    /// Returns the wire/CLI name of this resolution.
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictResolution::LocalWins => "local_wins",
            ConflictResolution::RemoteWins => "remote_wins",
        }
    }
}

impl fmt::Display for ConflictResolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConflictResolution {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "local_wins" | "local" => Ok(ConflictResolution::LocalWins),
            "remote_wins" | "remote" => Ok(ConflictResolution::RemoteWins),
            _ => Err(ProtocolError::InvalidResolution(s.to_string())),
        }
    }
}

/// Who picked a conflict's resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolvedBy {
    /// The configured policy.
    Policy,
    /// An explicit caller decision.
    Manual,
}

/// Outcome of automatic conflict evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoDecision {
    /// The local change is newer.
    LocalWins,
    /// The remote snapshot is newer or equally new.
    RemoteWins,
    /// No decision could be made.
    Undecided,
}

impl AutoDecision {
    /// Converts a decision into a resolution, if there is one.
    pub fn resolution(&self) -> Option<ConflictResolution> {
        match self {
            AutoDecision::LocalWins => Some(ConflictResolution::LocalWins),
            AutoDecision::RemoteWins => Some(ConflictResolution::RemoteWins),
            AutoDecision::Undecided => None,
        }
    }
}

/// A rejected change together with the remote state that rejected it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictRecord {
    /// Unique conflict ID.
    pub id: String,
    /// Entity namespace.
    pub entity_type: String,
    /// Entity ID.
    pub entity_id: String,
    /// Snapshot of the change that was rejected.
    pub local_change: ChangeRecord,
    /// The remote's current representation.
    ///
    /// `None` when the conflict response carried no readable body;
    /// `Some(Value::Null)` when the remote reports the entity as gone.
    pub remote_snapshot: Option<Value>,
    /// Last-modified time read from the remote snapshot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_updated_at: Option<DateTime<Utc>>,
    /// When the conflict was detected.
    pub detected_at: DateTime<Utc>,
    /// Set once, when the conflict is settled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<ConflictResolution>,
    /// Who settled the conflict.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_by: Option<ResolvedBy>,
    /// When the conflict was settled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
}

impl ConflictRecord {
    /// Creates an unresolved conflict for `local_change`.
    pub fn new(local_change: ChangeRecord, remote_snapshot: Option<Value>) -> Self {
        let remote_updated_at = remote_snapshot.as_ref().and_then(remote_timestamp);
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            entity_type: local_change.entity_type.clone(),
            entity_id: local_change.entity_id.clone(),
            local_change,
            remote_snapshot,
            remote_updated_at,
            detected_at: Utc::now(),
            resolution: None,
            resolved_by: None,
            resolved_at: None,
        }
    }

    /// Returns true if the conflict has been resolved.
    pub fn is_resolved(&self) -> bool {
        self.resolution.is_some()
    }

    /// Returns true if the remote already holds exactly the local payload.
    ///
    /// A remote tombstone matches a local delete.
    pub fn remote_matches_local(&self) -> bool {
        self.remote_snapshot
            .as_ref()
            .is_some_and(|snapshot| self.local_change.content_matches(snapshot))
    }

    /// Records the resolution.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyResolved` if a resolution was recorded before.
    pub fn resolve(
        &mut self,
        resolution: ConflictResolution,
        resolved_by: ResolvedBy,
        at: DateTime<Utc>,
    ) -> ProtocolResult<()> {
        if self.is_resolved() {
            return Err(ProtocolError::AlreadyResolved(self.id.clone()));
        }
        self.resolution = Some(resolution);
        self.resolved_by = Some(resolved_by);
        self.resolved_at = Some(at);
        Ok(())
    }
}

/// Policy applied when the remote reports a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// The side with the later modification time wins.
    #[default]
    LastWriteWins,
    /// The remote always wins.
    ServerWins,
    /// The local change always wins.
    ClientWins,
    /// Conflicts wait for an explicit decision.
    Manual,
}

impl ConflictPolicy {
    /// Returns true if this policy settles conflicts without a caller.
    pub fn auto_resolves(&self) -> bool {
        !matches!(self, ConflictPolicy::Manual)
    }

    /// Evaluates a conflict under this policy.
    pub fn decide(&self, conflict: &ConflictRecord) -> AutoDecision {
        match self {
            ConflictPolicy::LastWriteWins => last_write_wins(conflict),
            ConflictPolicy::ServerWins if conflict.remote_snapshot.is_some() => {
                AutoDecision::RemoteWins
            }
            ConflictPolicy::ServerWins => AutoDecision::Undecided,
            ConflictPolicy::ClientWins => AutoDecision::LocalWins,
            ConflictPolicy::Manual => AutoDecision::Undecided,
        }
    }

    /// Returns the configuration name of this policy.
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictPolicy::LastWriteWins => "last_write_wins",
            ConflictPolicy::ServerWins => "server_wins",
            ConflictPolicy::ClientWins => "client_wins",
            ConflictPolicy::Manual => "manual",
        }
    }
}

impl fmt::Display for ConflictPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConflictPolicy {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "last_write_wins" | "lww" => Ok(ConflictPolicy::LastWriteWins),
            "server_wins" | "remote_wins" => Ok(ConflictPolicy::ServerWins),
            "client_wins" | "local_wins" => Ok(ConflictPolicy::ClientWins),
            "manual" => Ok(ConflictPolicy::Manual),
            _ => Err(ProtocolError::InvalidPolicy(s.to_string())),
        }
    }
}

/// Compares the local change time against the remote's last-modified time.
///
/// Ties go to the remote. A missing or unreadable remote time leaves the
/// conflict undecided.
fn last_write_wins(conflict: &ConflictRecord) -> AutoDecision {
    match conflict.remote_updated_at {
        Some(remote) if conflict.local_change.created_at > remote => AutoDecision::LocalWins,
        Some(_) => AutoDecision::RemoteWins,
        None => AutoDecision::Undecided,
    }
}

/// Reads the last-modified time from a remote snapshot.
///
/// Checks [`TIMESTAMP_FIELDS`] at the top level, then inside a `data`
/// object for servers that wrap entities.
pub fn remote_timestamp(snapshot: &Value) -> Option<DateTime<Utc>> {
    let find = |object: &Value| {
        TIMESTAMP_FIELDS
            .iter()
            .find_map(|field| object.get(*field).and_then(parse_timestamp))
    };
    find(snapshot).or_else(|| snapshot.get("data").and_then(find))
}

/// Parses a timestamp value.
///
/// Accepts RFC 3339 strings, ISO 8601 strings without an offset (read as
/// UTC), and integers as Unix milliseconds.
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(text) => {
            let text = text.trim();
            if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
                return Some(parsed.with_timezone(&Utc));
            }
            ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
                .iter()
                .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
                .map(|naive| naive.and_utc())
        }
        Value::Number(number) => number.as_i64().and_then(DateTime::<Utc>::from_timestamp_millis),
        _ => None,
    }
}
