//! The sync engine.

use crate::config::SyncConfig;
use crate::conflicts::ConflictLog;
use crate::error::{SyncError, SyncResult};
use crate::http::HttpTransport;
use crate::monitor::{self, Connectivity, MonitorHandle, Transition};
use crate::queue::ChangeLog;
use crate::transport::RemoteEndpoint;
use chrono::{DateTime, Utc};
use offsync_storage::{
    write_atomic, BackupInfo, BackupManager, DocumentStore, FileStore, RestoreReport, StorageError,
};
use offsync_sync_protocol::{
    is_retryable_status, AutoDecision, ChangeKind, ChangeRecord, ConflictPolicy, ConflictRecord,
    ConflictResolution, RemoteOutcome, RemoteRequest, ResolvedBy, SyncState,
};
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// File holding the generated actor ID inside the sync directory.
const ACTOR_FILE: &str = "actor_id";
/// Directory holding backups inside the sync directory.
const BACKUPS_DIR: &str = "backups";

/// Result of delivering one change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeOutcome {
    /// The remote accepted the change; it left the queue.
    Synced,
    /// The remote reported a conflict, recorded under this ID.
    Conflict(String),
    /// Delivery failed; the change stays queued with a retry time.
    Failed,
}

/// Result of a manual conflict resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionOutcome {
    /// The local change was sent again right away.
    Retransmitted(ChangeOutcome),
    /// The local change was queued for the next pass (engine offline).
    Requeued,
    /// The remote snapshot replaced the local entity.
    RemoteApplied,
}

/// Summary of one sync pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Changes considered by the pass.
    pub total: usize,
    /// Changes accepted by the remote.
    pub synced: usize,
    /// Changes whose delivery failed.
    pub failed: usize,
    /// Changes the remote reported as conflicting.
    pub conflicts: usize,
    /// Changes not attempted (offline, backing off, or behind a blocked
    /// change of the same entity).
    pub deferred: usize,
    /// When the pass ended.
    pub finished_at: DateTime<Utc>,
}

impl SyncReport {
    fn new(total: usize) -> Self {
        Self {
            total,
            synced: 0,
            failed: 0,
            conflicts: 0,
            deferred: 0,
            finished_at: Utc::now(),
        }
    }
}

/// Snapshot of the engine's sync state.
#[derive(Debug, Clone, Serialize)]
pub struct SyncStatus {
    /// Whether the last probe reached the remote.
    pub is_online: bool,
    /// When the last sync pass finished.
    pub last_sync_at: Option<DateTime<Utc>>,
    /// Number of queued changes.
    pub pending_count: usize,
    /// Number of conflicts awaiting resolution.
    pub conflict_count: usize,
    /// Every conflict ever recorded, oldest first.
    pub conflict_history: Vec<ConflictRecord>,
    /// Number of queued changes whose last delivery failed.
    pub failed_count: usize,
    /// Queued change counts per entity type.
    pub queue: BTreeMap<String, usize>,
}

/// The offline-first sync engine.
///
/// Cheap to clone; clones share the same state. Saves and deletes hit the
/// local store first and are queued for delivery; sync passes drain the
/// queue against the remote.
///
/// # Example
///
/// ```rust,no_run
/// use offsync_sync_engine::{SyncConfig, SyncEngine};
/// use serde_json::json;
///
/// # async fn run() -> offsync_sync_engine::SyncResult<()> {
/// let engine = SyncEngine::open(SyncConfig::new("https://api.example.com", "./data"))?;
/// engine.save("note", "n1", json!({"text": "hello"}))?;
///
/// let monitor = engine.start_monitor();
/// // ...
/// monitor.stop().await;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct SyncEngine {
    inner: Arc<Inner>,
}

struct Inner {
    config: SyncConfig,
    actor_id: String,
    store: Arc<dyn DocumentStore>,
    remote: Arc<dyn RemoteEndpoint>,
    changes: ChangeLog,
    conflicts: ConflictLog,
    backups: BackupManager,
    connectivity: Connectivity,
    /// Serializes sync passes.
    sync_lock: tokio::sync::Mutex<()>,
    last_sync_at: RwLock<Option<DateTime<Utc>>>,
}

impl fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncEngine")
            .field("remote_url", &self.inner.config.remote_url)
            .field("actor_id", &self.inner.actor_id)
            .field("online", &self.inner.connectivity.is_online())
            .finish_non_exhaustive()
    }
}

impl SyncEngine {
    /// Opens an engine over a [`FileStore`] in `config.data_dir`, talking
    /// HTTP to `config.remote_url`.
    pub fn open(config: SyncConfig) -> SyncResult<Self> {
        config.validate()?;
        let store = FileStore::open(&config.data_dir)?;
        let remote = HttpTransport::from_config(&config)?;
        Self::with_parts(config, Arc::new(store), Arc::new(remote))
    }

    /// Creates an engine from explicit parts.
    ///
    /// The change log, conflict history and backups live in
    /// `config.sync_dir`.
    pub fn with_parts(
        config: SyncConfig,
        store: Arc<dyn DocumentStore>,
        remote: Arc<dyn RemoteEndpoint>,
    ) -> SyncResult<Self> {
        let changes = ChangeLog::open(&config.sync_dir)?;
        let conflicts = ConflictLog::open(&config.sync_dir)?;
        let backups = BackupManager::new(config.sync_dir.join(BACKUPS_DIR));
        let actor_id = match &config.actor_id {
            Some(actor_id) => actor_id.clone(),
            None => load_or_create_actor_id(&config.sync_dir)?,
        };

        info!(
            remote_url = %config.remote_url,
            sync_dir = %config.sync_dir.display(),
            actor_id = %actor_id,
            policy = %config.conflict_policy,
            "sync engine ready"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                actor_id,
                store,
                remote,
                changes,
                conflicts,
                backups,
                connectivity: Connectivity::new(),
                sync_lock: tokio::sync::Mutex::new(()),
                last_sync_at: RwLock::new(None),
            }),
        })
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    /// Returns the ID stamped on this engine's changes.
    pub fn actor_id(&self) -> &str {
        &self.inner.actor_id
    }

    /// Returns the durable change log.
    pub fn change_log(&self) -> &ChangeLog {
        &self.inner.changes
    }

    // === Local store ===

    /// Saves an entity locally and queues it for delivery.
    ///
    /// The change is a create if the entity did not exist, otherwise an
    /// update. When online and `sync_on_save` is set, a sync of this entity
    /// is started in the background. Returns the change ID.
    pub fn save(&self, entity_type: &str, entity_id: &str, data: Value) -> SyncResult<String> {
        let store = &self.inner.store;
        let kind = if store.exists(entity_type, entity_id)? {
            ChangeKind::Update
        } else {
            ChangeKind::Create
        };

        store.save(entity_type, entity_id, &data)?;
        let change = ChangeRecord::new(kind, entity_type, entity_id, data, &self.inner.actor_id);
        let change_id = self.inner.changes.enqueue(change)?;

        info!(entity_type, entity_id, kind = %kind, change_id = %change_id, "entity saved");
        self.after_local_change(entity_type, entity_id);
        Ok(change_id)
    }

    /// Loads an entity from the local store.
    pub fn load(&self, entity_type: &str, entity_id: &str) -> SyncResult<Option<Value>> {
        Ok(self.inner.store.load(entity_type, entity_id)?)
    }

    /// Lists all entities of a type.
    pub fn list(&self, entity_type: &str) -> SyncResult<Vec<(String, Value)>> {
        Ok(self.inner.store.list_all(entity_type)?)
    }

    /// Returns the entity types present in the local store.
    pub fn entity_types(&self) -> SyncResult<Vec<String>> {
        Ok(self.inner.store.entity_types()?)
    }

    /// Deletes an entity locally and queues the delete.
    ///
    /// Returns false, queuing nothing, if the entity did not exist.
    pub fn delete(&self, entity_type: &str, entity_id: &str) -> SyncResult<bool> {
        if !self.inner.store.delete(entity_type, entity_id)? {
            return Ok(false);
        }

        let change = ChangeRecord::delete(entity_type, entity_id, &self.inner.actor_id);
        let change_id = self.inner.changes.enqueue(change)?;

        info!(entity_type, entity_id, change_id = %change_id, "entity deleted");
        self.after_local_change(entity_type, entity_id);
        Ok(true)
    }

    fn after_local_change(&self, entity_type: &str, entity_id: &str) {
        if !self.inner.config.sync_on_save || !self.is_online() {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!(entity_type, entity_id, "no async runtime, immediate sync skipped");
            return;
        };

        let engine = self.clone();
        let entity_type = entity_type.to_string();
        let entity_id = entity_id.to_string();
        runtime.spawn(async move {
            if let Err(err) = engine.sync_entity(&entity_type, &entity_id).await {
                error!(entity_type = %entity_type, entity_id = %entity_id, error = %err, "immediate sync failed");
            }
        });
    }

    // === Connectivity ===

    /// Returns true if the last probe reached the remote.
    pub fn is_online(&self) -> bool {
        self.inner.connectivity.is_online()
    }

    /// Probes the remote once and updates the online flag.
    ///
    /// The probe is bounded by `probe_timeout`; a probe that runs out of
    /// time counts as offline.
    pub async fn check_connectivity(&self) -> Transition {
        let reachable = tokio::time::timeout(self.inner.config.probe_timeout, self.inner.remote.probe())
            .await
            .unwrap_or(false);

        let transition = self.inner.connectivity.record(reachable);
        match transition {
            Transition::CameOnline => info!(remote_url = %self.inner.config.remote_url, "remote reachable, engine online"),
            Transition::WentOffline => warn!(remote_url = %self.inner.config.remote_url, "remote unreachable, engine offline"),
            Transition::Unchanged => debug!(online = reachable, "connectivity unchanged"),
        }
        transition
    }

    /// Starts the background connectivity monitor.
    ///
    /// Must be called from within a Tokio runtime. The monitor runs until
    /// the returned handle is stopped or dropped.
    pub fn start_monitor(&self) -> MonitorHandle {
        monitor::spawn(self.clone(), self.inner.config.probe_interval)
    }

    // === Sync passes ===

    /// Attempts delivery of every queued change.
    ///
    /// Only one pass runs at a time. Changes of the same entity are sent in
    /// order; once one is blocked, later ones for that entity wait for the
    /// next pass. Nothing is sent while offline.
    ///
    /// # Errors
    ///
    /// Only failures to persist the change log or conflict history abort
    /// the pass; delivery failures are reported in the [`SyncReport`].
    pub async fn sync_all(&self) -> SyncResult<SyncReport> {
        let _pass = self.inner.sync_lock.lock().await;
        let changes = self.inner.changes.all_pending();
        let report = self.drain(changes).await?;
        info!(
            total = report.total,
            synced = report.synced,
            failed = report.failed,
            conflicts = report.conflicts,
            deferred = report.deferred,
            "sync pass finished"
        );
        Ok(report)
    }

    /// Attempts delivery of the queued changes of one entity.
    pub async fn sync_entity(&self, entity_type: &str, entity_id: &str) -> SyncResult<SyncReport> {
        let _pass = self.inner.sync_lock.lock().await;
        let changes = self.inner.changes.for_entity(entity_type, entity_id);
        let report = self.drain(changes).await?;
        debug!(entity_type, entity_id, synced = report.synced, deferred = report.deferred, "entity sync finished");
        Ok(report)
    }

    /// Sends one queued change now, regardless of backoff.
    ///
    /// # Errors
    ///
    /// `ChangeNotFound` for unknown IDs, `AwaitingResolution` while the
    /// change is held by a conflict, and `OutOfOrder` if an earlier change
    /// of the same entity is still queued. Nothing is sent in those cases.
    pub async fn sync_one(&self, change_id: &str) -> SyncResult<ChangeOutcome> {
        let _pass = self.inner.sync_lock.lock().await;
        let change = self
            .inner
            .changes
            .get(change_id)
            .ok_or_else(|| SyncError::ChangeNotFound(change_id.to_string()))?;
        if change.state == SyncState::Conflict {
            return Err(SyncError::AwaitingResolution(change.id));
        }
        if let Some(head) = self.queued_ahead_of(&change) {
            return Err(SyncError::OutOfOrder {
                change_id: change.id,
                blocked_by: head.id,
            });
        }
        self.send_change(change).await
    }

    /// Returns the entity's oldest queued change if it is not `change`.
    fn queued_ahead_of(&self, change: &ChangeRecord) -> Option<ChangeRecord> {
        self.inner
            .changes
            .head_for_entity(&change.entity_type, &change.entity_id)
            .filter(|head| head.id != change.id)
    }

    async fn drain(&self, changes: Vec<ChangeRecord>) -> SyncResult<SyncReport> {
        let mut report = SyncReport::new(changes.len());
        if !self.is_online() {
            report.deferred = report.total;
            debug!(pending = report.total, "offline, nothing sent");
            return Ok(report);
        }

        let now = Utc::now();
        let mut blocked: HashSet<(String, String)> = HashSet::new();

        for change in changes {
            let key = (change.entity_type.clone(), change.entity_id.clone());
            if blocked.contains(&key) {
                report.deferred += 1;
                continue;
            }
            // A resolution may have removed or requeued it since the snapshot.
            let Some(current) = self.inner.changes.get(&change.id) else {
                continue;
            };
            if !current.is_due(now) {
                blocked.insert(key);
                report.deferred += 1;
                continue;
            }

            match self.send_change(current).await? {
                ChangeOutcome::Synced => report.synced += 1,
                ChangeOutcome::Conflict(_) => {
                    report.conflicts += 1;
                    blocked.insert(key);
                }
                ChangeOutcome::Failed => {
                    report.failed += 1;
                    blocked.insert(key);
                }
            }
        }

        report.finished_at = Utc::now();
        *self.inner.last_sync_at.write() = Some(report.finished_at);
        Ok(report)
    }

    async fn send_change(&self, change: ChangeRecord) -> SyncResult<ChangeOutcome> {
        let change = self
            .inner
            .changes
            .update(&change.id, ChangeRecord::mark_syncing)?;
        let request = RemoteRequest::for_change(&change);
        debug!(change_id = %change.id, method = %request.method, path = %request.path, "sending change");

        let sent = match tokio::time::timeout(
            self.inner.config.request_timeout,
            self.inner.remote.send(&request),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(SyncError::Timeout),
        };

        match sent.map(|response| response.outcome()) {
            Ok(RemoteOutcome::Accepted) => {
                self.inner.changes.dequeue_synced(&change.id)?;
                debug!(change_id = %change.id, entity_type = %change.entity_type, entity_id = %change.entity_id, "change synced");
                Ok(ChangeOutcome::Synced)
            }
            Ok(RemoteOutcome::Conflict { snapshot }) => self.handle_conflict(change, snapshot),
            Ok(RemoteOutcome::Rejected { status, body }) => {
                debug!(change_id = %change.id, status, body = %body, "remote rejected change");
                let err = SyncError::RemoteRejected {
                    status,
                    retryable: is_retryable_status(status),
                };
                self.record_failure(&change, &err)
            }
            Err(err) => self.record_failure(&change, &err),
        }
    }

    fn record_failure(&self, change: &ChangeRecord, err: &SyncError) -> SyncResult<ChangeOutcome> {
        let delay = self
            .inner
            .config
            .retry
            .delay_for_attempt(change.attempts.saturating_add(1));
        let next_attempt_at = chrono::Duration::from_std(delay)
            .ok()
            .and_then(|delay| Utc::now().checked_add_signed(delay))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        let updated = self
            .inner
            .changes
            .update(&change.id, |change| change.mark_failed(err.to_string(), next_attempt_at))?;

        warn!(
            change_id = %updated.id,
            entity_type = %updated.entity_type,
            entity_id = %updated.entity_id,
            attempts = updated.attempts,
            retryable = err.is_retryable(),
            retry_at = %next_attempt_at,
            error = %err,
            "change delivery failed"
        );
        Ok(ChangeOutcome::Failed)
    }

    // === Conflicts ===

    fn handle_conflict(
        &self,
        change: ChangeRecord,
        snapshot: Option<Value>,
    ) -> SyncResult<ChangeOutcome> {
        let mut conflict = ConflictRecord::new(change, snapshot);
        if conflict.remote_matches_local() {
            // An earlier attempt landed but its answer was lost.
            let change = self.inner.changes.dequeue_synced(&conflict.local_change.id)?;
            info!(
                change_id = %change.id,
                entity_type = %change.entity_type,
                entity_id = %change.entity_id,
                "remote already holds the local content, change settled"
            );
            return Ok(ChangeOutcome::Synced);
        }

        conflict.local_change = self
            .inner
            .changes
            .update(&conflict.local_change.id, ChangeRecord::mark_conflict)?;
        let conflict_id = conflict.id.clone();
        let policy = self.inner.config.conflict_policy;
        let decision = policy.decide(&conflict);

        warn!(
            conflict_id = %conflict_id,
            entity_type = %conflict.entity_type,
            entity_id = %conflict.entity_id,
            remote_updated_at = ?conflict.remote_updated_at,
            "remote reported a conflict"
        );
        self.inner.conflicts.record(conflict)?;

        match decision.resolution() {
            Some(resolution) if policy.auto_resolves() => {
                self.apply_resolution(&conflict_id, resolution, ResolvedBy::Policy)?;
                info!(conflict_id = %conflict_id, policy = %policy, resolution = %resolution, "conflict resolved by policy");
            }
            _ => info!(conflict_id = %conflict_id, policy = %policy, "conflict awaits manual resolution"),
        }
        Ok(ChangeOutcome::Conflict(conflict_id))
    }

    /// Evaluates a conflict with last-write-wins.
    ///
    /// Pure: records nothing and changes nothing. A strictly newer local
    /// change wins; ties and newer remote versions go to the remote; a
    /// missing remote timestamp leaves the conflict undecided.
    pub fn resolve_auto(&self, conflict: &ConflictRecord) -> AutoDecision {
        ConflictPolicy::LastWriteWins.decide(conflict)
    }

    /// Settles a conflict by hand.
    ///
    /// `LocalWins` sends the original change again immediately when online
    /// (or queues it otherwise). `RemoteWins` drops the local change and
    /// writes the remote snapshot over the local entity, unless a later
    /// local change of the entity is still queued.
    ///
    /// # Errors
    ///
    /// `ConflictNotFound` for unknown IDs, `AlreadyResolved` for conflicts
    /// that were settled before.
    pub async fn resolve_manual(
        &self,
        conflict_id: &str,
        resolution: ConflictResolution,
    ) -> SyncResult<ResolutionOutcome> {
        let conflict = self.apply_resolution(conflict_id, resolution, ResolvedBy::Manual)?;
        info!(conflict_id, resolution = %resolution, "conflict resolved manually");

        match resolution {
            ConflictResolution::RemoteWins => Ok(ResolutionOutcome::RemoteApplied),
            ConflictResolution::LocalWins => {
                if !self.is_online() {
                    return Ok(ResolutionOutcome::Requeued);
                }
                let _pass = self.inner.sync_lock.lock().await;
                match self.inner.changes.get(&conflict.local_change.id) {
                    Some(change) if self.queued_ahead_of(&change).is_none() => Ok(
                        ResolutionOutcome::Retransmitted(self.send_change(change).await?),
                    ),
                    _ => Ok(ResolutionOutcome::Requeued),
                }
            }
        }
    }

    fn apply_resolution(
        &self,
        conflict_id: &str,
        resolution: ConflictResolution,
        resolved_by: ResolvedBy,
    ) -> SyncResult<ConflictRecord> {
        let conflict = self
            .inner
            .conflicts
            .resolve(conflict_id, resolution, resolved_by, Utc::now())?;
        let change_id = &conflict.local_change.id;
        let queued = self.inner.changes.get(change_id).is_some();

        match resolution {
            ConflictResolution::LocalWins => {
                if queued {
                    self.inner.changes.update(change_id, ChangeRecord::requeue)?;
                } else {
                    let mut change = conflict.local_change.clone();
                    change.requeue();
                    self.inner.changes.enqueue(change)?;
                }
            }
            ConflictResolution::RemoteWins => {
                let newer_local = self
                    .inner
                    .changes
                    .for_entity(&conflict.entity_type, &conflict.entity_id)
                    .iter()
                    .any(|change| change.id != *change_id);
                if newer_local {
                    info!(
                        conflict_id = %conflict.id,
                        entity_type = %conflict.entity_type,
                        entity_id = %conflict.entity_id,
                        "later local change queued, remote version not applied"
                    );
                } else {
                    self.apply_remote_snapshot(&conflict)?;
                }
                if queued {
                    self.inner.changes.remove(change_id)?;
                }
            }
        }
        Ok(conflict)
    }

    fn apply_remote_snapshot(&self, conflict: &ConflictRecord) -> SyncResult<()> {
        let (entity_type, entity_id) = (&conflict.entity_type, &conflict.entity_id);
        match &conflict.remote_snapshot {
            Some(Value::Null) => {
                self.inner.store.delete(entity_type, entity_id)?;
                debug!(entity_type = %entity_type, entity_id = %entity_id, "entity removed to match remote");
            }
            Some(snapshot) => {
                self.inner.store.save(entity_type, entity_id, snapshot)?;
                debug!(entity_type = %entity_type, entity_id = %entity_id, "entity replaced by remote version");
            }
            None => warn!(
                conflict_id = %conflict.id,
                "conflict has no remote snapshot, local entity left unchanged"
            ),
        }
        Ok(())
    }

    /// Returns every recorded conflict, oldest first.
    pub fn conflicts(&self) -> Vec<ConflictRecord> {
        self.inner.conflicts.all()
    }

    /// Returns the conflicts awaiting resolution.
    pub fn unresolved_conflicts(&self) -> Vec<ConflictRecord> {
        self.inner.conflicts.unresolved()
    }

    /// Returns a conflict by ID.
    pub fn conflict(&self, conflict_id: &str) -> Option<ConflictRecord> {
        self.inner.conflicts.get(conflict_id)
    }

    // === Backups ===

    /// Backs up the local store.
    ///
    /// Without a name, the current UTC time (`%Y%m%d_%H%M%S`) is used.
    pub fn create_backup(&self, name: Option<&str>) -> SyncResult<BackupInfo> {
        Ok(self
            .inner
            .backups
            .create_backup(self.inner.store.as_ref(), name)?)
    }

    /// Restores the local store from a backup directory.
    ///
    /// Queued changes are left as they are; changes touching restored
    /// namespaces are still delivered.
    pub fn restore_backup(&self, path: &Path) -> SyncResult<RestoreReport> {
        let report = self
            .inner
            .backups
            .restore_backup(self.inner.store.as_ref(), path)?;

        let affected = self
            .inner
            .changes
            .all_pending()
            .iter()
            .filter(|change| report.entity_types.contains(&change.entity_type))
            .count();
        if affected > 0 {
            warn!(
                pending = affected,
                "restored namespaces have queued changes; they stay queued"
            );
        }
        Ok(report)
    }

    /// Lists backups, oldest first.
    pub fn list_backups(&self) -> SyncResult<Vec<BackupInfo>> {
        Ok(self.inner.backups.list_backups()?)
    }

    /// Returns the directory a backup with `name` lives in.
    pub fn backup_path(&self, name: &str) -> PathBuf {
        self.inner.backups.backup_path(name)
    }

    // === Status ===

    /// Returns a snapshot of the sync state.
    pub fn status(&self) -> SyncStatus {
        let changes = &self.inner.changes;
        let conflicts = &self.inner.conflicts;
        SyncStatus {
            is_online: self.is_online(),
            last_sync_at: *self.inner.last_sync_at.read(),
            pending_count: changes.pending_count(),
            conflict_count: conflicts.unresolved_count(),
            conflict_history: conflicts.all(),
            failed_count: changes.count_in_state(SyncState::Failed),
            queue: changes.counts_by_type(),
        }
    }

    /// Returns every queued change.
    pub fn pending_changes(&self) -> Vec<ChangeRecord> {
        self.inner.changes.all_pending()
    }

    /// Returns the queued changes of one entity, newest first.
    pub fn version_history(&self, entity_type: &str, entity_id: &str) -> Vec<ChangeRecord> {
        self.inner.changes.history(entity_type, entity_id)
    }
}

fn load_or_create_actor_id(sync_dir: &Path) -> SyncResult<String> {
    let path = sync_dir.join(ACTOR_FILE);
    match fs::read_to_string(&path) {
        Ok(text) if !text.trim().is_empty() => return Ok(text.trim().to_string()),
        Ok(_) => {}
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => return Err(StorageError::from(err).into()),
    }

    let actor_id = uuid::Uuid::new_v4().to_string();
    write_atomic(&path, actor_id.as_bytes())?;
    info!(actor_id = %actor_id, "generated actor id");
    Ok(actor_id)
}
