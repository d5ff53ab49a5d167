//! Durable conflict history.

use crate::error::{SyncError, SyncResult};
use chrono::{DateTime, Utc};
use offsync_storage::{write_atomic, StorageError};
use offsync_sync_protocol::{ConflictRecord, ConflictResolution, ResolvedBy};
use parking_lot::Mutex;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::error;

/// File holding the conflict history inside the sync directory.
pub const CONFLICTS_FILE: &str = "conflicts.json";

/// Append-only conflict history persisted to `<sync_dir>/conflicts.json`.
///
/// Records are never removed. The only mutation after insertion is setting
/// a resolution, which happens at most once per record.
#[derive(Debug)]
pub struct ConflictLog {
    path: PathBuf,
    records: Mutex<Vec<ConflictRecord>>,
}

impl ConflictLog {
    /// Opens the conflict history in `sync_dir`, creating it if needed.
    pub fn open(sync_dir: &Path) -> SyncResult<Self> {
        fs::create_dir_all(sync_dir).map_err(StorageError::from)?;
        let path = sync_dir.join(CONFLICTS_FILE);

        let records = match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice::<Vec<ConflictRecord>>(&bytes)
                .map_err(|err| StorageError::corrupted(&path, err.to_string()))?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(err) => return Err(StorageError::from(err).into()),
        };

        Ok(Self {
            path,
            records: Mutex::new(records),
        })
    }

    /// Appends a new conflict.
    pub fn record(&self, conflict: ConflictRecord) -> SyncResult<()> {
        self.mutate(|records| {
            records.push(conflict);
            Ok(())
        })
    }

    /// Sets the resolution of a conflict and returns the updated record.
    ///
    /// # Errors
    ///
    /// `ConflictNotFound` for unknown IDs; `AlreadyResolved` if the
    /// conflict was settled before.
    pub fn resolve(
        &self,
        conflict_id: &str,
        resolution: ConflictResolution,
        resolved_by: ResolvedBy,
        at: DateTime<Utc>,
    ) -> SyncResult<ConflictRecord> {
        self.mutate(|records| {
            let record = records
                .iter_mut()
                .find(|record| record.id == conflict_id)
                .ok_or_else(|| SyncError::ConflictNotFound(conflict_id.to_string()))?;
            record.resolve(resolution, resolved_by, at)?;
            Ok(record.clone())
        })
    }

    /// Returns a conflict by ID.
    pub fn get(&self, conflict_id: &str) -> Option<ConflictRecord> {
        self.records
            .lock()
            .iter()
            .find(|record| record.id == conflict_id)
            .cloned()
    }

    /// Returns the full history, oldest first.
    pub fn all(&self) -> Vec<ConflictRecord> {
        self.records.lock().clone()
    }

    /// Returns conflicts that still need a decision.
    pub fn unresolved(&self) -> Vec<ConflictRecord> {
        self.records
            .lock()
            .iter()
            .filter(|record| !record.is_resolved())
            .cloned()
            .collect()
    }

    /// Returns the number of conflicts that still need a decision.
    pub fn unresolved_count(&self) -> usize {
        self.records
            .lock()
            .iter()
            .filter(|record| !record.is_resolved())
            .count()
    }

    fn mutate<R>(
        &self,
        f: impl FnOnce(&mut Vec<ConflictRecord>) -> SyncResult<R>,
    ) -> SyncResult<R> {
        let mut guard = self.records.lock();
        let mut next = guard.clone();
        let result = f(&mut next)?;
        let bytes = serde_json::to_vec_pretty(&next)?;
        write_atomic(&self.path, &bytes).map_err(|err| {
            error!(path = %self.path.display(), error = %err, "failed to persist conflict history");
            SyncError::from(err)
        })?;
        *guard = next;
        Ok(result)
    }
}
