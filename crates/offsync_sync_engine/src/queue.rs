//! Durable change log.

use crate::error::{SyncError, SyncResult};
use offsync_storage::{write_atomic, StorageError};
use offsync_sync_protocol::{ChangeQueue, ChangeRecord, SyncState};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

/// File holding the serialized queue inside the sync directory.
pub const QUEUE_FILE: &str = "sync_queue.json";

/// The [`ChangeQueue`] persisted to `<sync_dir>/sync_queue.json`.
///
/// Every mutation is applied to a copy of the queue, written atomically,
/// and only then made visible. A failed write leaves both the file and the
/// in-memory queue unchanged.
#[derive(Debug)]
pub struct ChangeLog {
    path: PathBuf,
    queue: Mutex<ChangeQueue>,
}

impl ChangeLog {
    /// Opens the change log in `sync_dir`, creating it if needed.
    ///
    /// Changes left `Syncing` by an interrupted process go back to
    /// `Pending`.
    pub fn open(sync_dir: &Path) -> SyncResult<Self> {
        fs::create_dir_all(sync_dir).map_err(StorageError::from)?;
        let path = sync_dir.join(QUEUE_FILE);

        let mut queue = match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice::<ChangeQueue>(&bytes)
                .map_err(|err| StorageError::corrupted(&path, err.to_string()))?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => ChangeQueue::new(),
            Err(err) => return Err(StorageError::from(err).into()),
        };

        let reset = queue.reset_in_flight();
        let log = Self {
            path,
            queue: Mutex::new(ChangeQueue::new()),
        };
        if reset > 0 {
            info!(reset, "returned interrupted changes to pending");
            log.persist(&queue)?;
        }
        info!(pending = queue.len(), path = %log.path.display(), "change log opened");
        *log.queue.lock() = queue;
        Ok(log)
    }

    /// Returns the path of the queue file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends a change.
    pub fn enqueue(&self, change: ChangeRecord) -> SyncResult<String> {
        let entity_type = change.entity_type.clone();
        let entity_id = change.entity_id.clone();
        let kind = change.kind;
        let id = self.mutate(|queue| Ok(queue.enqueue(change)))?;
        debug!(change_id = %id, entity_type = %entity_type, entity_id = %entity_id, kind = %kind, "change enqueued");
        Ok(id)
    }

    /// Removes a change the remote accepted and returns it marked synced.
    pub fn dequeue_synced(&self, change_id: &str) -> SyncResult<ChangeRecord> {
        let mut change = self.remove(change_id)?;
        change.mark_synced(chrono::Utc::now());
        Ok(change)
    }

    /// Removes a change without delivering it.
    pub fn remove(&self, change_id: &str) -> SyncResult<ChangeRecord> {
        self.mutate(|queue| {
            queue
                .remove(change_id)
                .ok_or_else(|| SyncError::ChangeNotFound(change_id.to_string()))
        })
    }

    /// Applies `f` to a queued change and returns the updated record.
    pub fn update<F>(&self, change_id: &str, f: F) -> SyncResult<ChangeRecord>
    where
        F: FnOnce(&mut ChangeRecord),
    {
        self.mutate(|queue| {
            let change = queue
                .get_mut(change_id)
                .ok_or_else(|| SyncError::ChangeNotFound(change_id.to_string()))?;
            f(change);
            Ok(change.clone())
        })
    }

    /// Returns a queued change.
    pub fn get(&self, change_id: &str) -> Option<ChangeRecord> {
        self.queue.lock().get(change_id).cloned()
    }

    /// Returns every queued change, grouped by entity type, oldest first
    /// within a group.
    pub fn all_pending(&self) -> Vec<ChangeRecord> {
        self.queue.lock().iter().cloned().collect()
    }

    /// Returns the queued changes for one entity, oldest first.
    pub fn for_entity(&self, entity_type: &str, entity_id: &str) -> Vec<ChangeRecord> {
        self.queue
            .lock()
            .for_entity(entity_type, entity_id)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Returns the oldest queued change for one entity.
    pub fn head_for_entity(&self, entity_type: &str, entity_id: &str) -> Option<ChangeRecord> {
        self.queue
            .lock()
            .head_for_entity(entity_type, entity_id)
            .cloned()
    }

    /// Returns the queued changes for one entity, newest first.
    pub fn history(&self, entity_type: &str, entity_id: &str) -> Vec<ChangeRecord> {
        let mut changes = self.for_entity(entity_type, entity_id);
        changes.reverse();
        changes
    }

    /// Returns the number of queued changes.
    pub fn pending_count(&self) -> usize {
        self.queue.lock().len()
    }

    /// Returns the number of queued changes in `state`.
    pub fn count_in_state(&self, state: SyncState) -> usize {
        self.queue.lock().count_in_state(state)
    }

    /// Returns queued change counts keyed by entity type.
    pub fn counts_by_type(&self) -> BTreeMap<String, usize> {
        self.queue.lock().counts_by_type()
    }

    fn mutate<R>(&self, f: impl FnOnce(&mut ChangeQueue) -> SyncResult<R>) -> SyncResult<R> {
        let mut guard = self.queue.lock();
        let mut next = guard.clone();
        let result = f(&mut next)?;
        self.persist(&next)?;
        *guard = next;
        Ok(result)
    }

    fn persist(&self, queue: &ChangeQueue) -> SyncResult<()> {
        let bytes = serde_json::to_vec_pretty(queue)?;
        write_atomic(&self.path, &bytes).map_err(|err| {
            error!(path = %self.path.display(), error = %err, "failed to persist change log");
            SyncError::from(err)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn note(id: &str, text: &str) -> ChangeRecord {
        ChangeRecord::update("note", id, json!({ "text": text }), "dev-1")
    }

    #[test]
    fn changes_survive_reopen() {
        let dir = tempdir().unwrap();

        let (a, b) = {
            let log = ChangeLog::open(dir.path()).unwrap();
            let a = log.enqueue(note("n1", "a")).unwrap();
            let b = log.enqueue(note("n1", "b")).unwrap();
            (a, b)
        };

        let log = ChangeLog::open(dir.path()).unwrap();
        let ids: Vec<_> = log.all_pending().into_iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![a.clone(), b.clone()]);

        let history: Vec<_> = log.history("note", "n1").into_iter().map(|c| c.id).collect();
        assert_eq!(history, vec![b, a]);
    }

    #[test]
    fn syncing_resets_to_pending_on_open() {
        let dir = tempdir().unwrap();

        let id = {
            let log = ChangeLog::open(dir.path()).unwrap();
            let id = log.enqueue(note("n1", "a")).unwrap();
            log.update(&id, ChangeRecord::mark_syncing).unwrap();
            id
        };

        let log = ChangeLog::open(dir.path()).unwrap();
        assert_eq!(log.get(&id).unwrap().state, SyncState::Pending);
        assert_eq!(log.count_in_state(SyncState::Syncing), 0);
    }

    #[test]
    fn dequeue_removes_exactly_once() {
        let dir = tempdir().unwrap();
        let log = ChangeLog::open(dir.path()).unwrap();
        let id = log.enqueue(note("n1", "a")).unwrap();

        let synced = log.dequeue_synced(&id).unwrap();
        assert_eq!(synced.state, SyncState::Synced);
        assert!(synced.synced_at.is_some());
        assert_eq!(log.pending_count(), 0);

        assert!(matches!(
            log.dequeue_synced(&id),
            Err(SyncError::ChangeNotFound(_))
        ));
    }

    #[test]
    fn update_unknown_change_fails() {
        let dir = tempdir().unwrap();
        let log = ChangeLog::open(dir.path()).unwrap();
        assert!(matches!(
            log.update("missing", ChangeRecord::requeue),
            Err(SyncError::ChangeNotFound(_))
        ));
    }

    #[test]
    fn corrupted_queue_file_is_an_error() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(QUEUE_FILE), b"{not json").unwrap();

        assert!(matches!(
            ChangeLog::open(dir.path()),
            Err(SyncError::Storage(StorageError::Corrupted { .. }))
        ));
    }

    #[test]
    fn counts_by_type() {
        let dir = tempdir().unwrap();
        let log = ChangeLog::open(dir.path()).unwrap();
        log.enqueue(note("n1", "a")).unwrap();
        log.enqueue(note("n2", "b")).unwrap();
        log.enqueue(ChangeRecord::delete("task", "t1", "dev-1")).unwrap();

        let counts = log.counts_by_type();
        assert_eq!(counts.get("note"), Some(&2));
        assert_eq!(counts.get("task"), Some(&1));
        assert_eq!(log.pending_count(), 3);
    }
}
