//! Backup and restore of a whole document store.
//!
//! A backup is a directory that mirrors the [`FileStore`](crate::FileStore)
//! layout plus a manifest:
//!
//! ```text
//! <backups_dir>/
//! └─ backup_<name>/
//!    ├─ BACKUP.json       # Manifest (name, creation time, counts)
//!    ├─ note/
//!    │  └─ n1.json
//!    └─ task/
//!       └─ t1.json
//! ```
//!
//! Backups are assembled in a hidden staging directory and renamed into
//! place only once complete, so a directory named `backup_<name>` is always
//! a full copy. Restore replaces each namespace found in the backup
//! wholesale and leaves other namespaces alone.

use crate::atomic::{sync_directory, write_atomic};
use crate::error::{StorageError, StorageResult};
use crate::file::{document_files, read_document};
use crate::store::{validate_name, DocumentStore};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Manifest file inside every backup directory.
const MANIFEST_FILE: &str = "BACKUP.json";
/// Prefix of backup directory names.
const BACKUP_PREFIX: &str = "backup_";
/// Current backup manifest version.
const BACKUP_FORMAT_VERSION: u32 = 1;

/// Metadata about a backup, stored as its manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupInfo {
    /// Manifest format version.
    pub format_version: u32,
    /// Backup name (directory is `backup_<name>`).
    pub name: String,
    /// When the backup was created.
    pub created_at: DateTime<Utc>,
    /// Document count per entity type.
    pub entity_types: BTreeMap<String, usize>,
    /// Total number of documents.
    pub documents: usize,
    /// Documents left out because they could not be read.
    #[serde(default)]
    pub skipped: usize,
    /// Backup directory. Not stored in the manifest.
    #[serde(skip)]
    pub path: PathBuf,
}

/// Result of a restore.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreReport {
    /// Entity types whose namespaces were replaced.
    pub entity_types: Vec<String>,
    /// Number of documents restored.
    pub documents: usize,
    /// Files in the backup that were skipped because they could not be read.
    pub skipped: usize,
}

/// Creates, lists and restores backups under one directory.
#[derive(Debug, Clone)]
pub struct BackupManager {
    backups_dir: PathBuf,
}

impl BackupManager {
    /// Creates a manager that keeps backups in `backups_dir`.
    #[must_use]
    pub fn new(backups_dir: impl Into<PathBuf>) -> Self {
        Self {
            backups_dir: backups_dir.into(),
        }
    }

    /// Returns the directory holding the backups.
    #[must_use]
    pub fn backups_dir(&self) -> &Path {
        &self.backups_dir
    }

    /// Returns the directory a backup called `name` lives in.
    #[must_use]
    pub fn backup_path(&self, name: &str) -> PathBuf {
        self.backups_dir.join(format!("{BACKUP_PREFIX}{name}"))
    }

    /// Snapshots every namespace of `store`.
    ///
    /// Without a name, the current UTC time (`%Y%m%d_%H%M%S`) is used.
    ///
    /// # Errors
    ///
    /// Fails if the name is invalid, a backup with that name exists, the
    /// store cannot be listed, or the copy cannot be written. On failure
    /// nothing is left behind under the backup's final name. A document
    /// that cannot be read is logged, counted in
    /// [`BackupInfo::skipped`] and left out.
    pub fn create_backup<S>(&self, store: &S, name: Option<&str>) -> StorageResult<BackupInfo>
    where
        S: DocumentStore + ?Sized,
    {
        let created_at = Utc::now();
        let name = match name {
            Some(name) => name.to_string(),
            None => created_at.format("%Y%m%d_%H%M%S").to_string(),
        };
        validate_name("backup", &name)?;

        let final_path = self.backup_path(&name);
        if final_path.exists() {
            return Err(StorageError::BackupExists(final_path));
        }

        fs::create_dir_all(&self.backups_dir)?;
        let staging = self.backups_dir.join(format!(
            ".{BACKUP_PREFIX}{name}.{}.partial",
            uuid::Uuid::new_v4().simple()
        ));

        let result = write_snapshot(store, &staging, &name, created_at)
            .and_then(|info| {
                fs::rename(&staging, &final_path)?;
                sync_directory(&self.backups_dir)?;
                Ok(info)
            });

        match result {
            Ok(mut info) => {
                info.path = final_path;
                info!(
                    backup = %info.name,
                    documents = info.documents,
                    skipped = info.skipped,
                    path = %info.path.display(),
                    "backup created"
                );
                Ok(info)
            }
            Err(err) => {
                if staging.exists() {
                    if let Err(cleanup) = fs::remove_dir_all(&staging) {
                        warn!(path = %staging.display(), error = %cleanup, "failed to remove partial backup");
                    }
                }
                Err(err)
            }
        }
    }

    /// Reads the manifest of the backup at `path`.
    pub fn read_info(&self, path: &Path) -> StorageResult<BackupInfo> {
        if !path.is_dir() {
            return Err(StorageError::BackupNotFound(path.to_path_buf()));
        }
        let manifest_path = path.join(MANIFEST_FILE);
        let mut info: BackupInfo = match read_document(&manifest_path)? {
            Some(value) => serde_json::from_value(value)
                .map_err(|e| StorageError::invalid_backup(path, e.to_string()))?,
            None => return Err(StorageError::invalid_backup(path, "missing BACKUP.json")),
        };
        if info.format_version != BACKUP_FORMAT_VERSION {
            return Err(StorageError::invalid_backup(
                path,
                format!(
                    "unsupported format_version {} (expected {BACKUP_FORMAT_VERSION})",
                    info.format_version
                ),
            ));
        }
        info.path = path.to_path_buf();
        Ok(info)
    }

    /// Lists the complete backups, oldest first.
    ///
    /// Directories with an unreadable manifest are logged and skipped.
    pub fn list_backups(&self) -> StorageResult<Vec<BackupInfo>> {
        let entries = match fs::read_dir(&self.backups_dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut backups = Vec::new();
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.starts_with(BACKUP_PREFIX) || !entry.file_type()?.is_dir() {
                continue;
            }
            match self.read_info(&entry.path()) {
                Ok(info) => backups.push(info),
                Err(err) => warn!(path = %entry.path().display(), error = %err, "skipping unreadable backup"),
            }
        }
        backups.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.name.cmp(&b.name)));
        Ok(backups)
    }

    /// Restores `store` from the backup at `path`.
    ///
    /// Each namespace present in the backup replaces the store's namespace
    /// of the same name (remove, then copy). Namespaces absent from the
    /// backup are untouched. Unreadable files inside the backup are logged
    /// and skipped.
    pub fn restore_backup<S>(&self, store: &S, path: &Path) -> StorageResult<RestoreReport>
    where
        S: DocumentStore + ?Sized,
    {
        let info = self.read_info(path)?;

        let mut report = RestoreReport::default();
        let mut namespaces = Vec::new();
        for entry in fs::read_dir(path)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let entity_type = entry.file_name().to_string_lossy().into_owned();
            if validate_name("entity type", &entity_type).is_err() {
                warn!(path = %entry.path().display(), "skipping unexpected directory in backup");
                continue;
            }
            namespaces.push((entity_type, entry.path()));
        }
        namespaces.sort();

        for (entity_type, dir) in namespaces {
            let mut documents = Vec::new();
            for (entity_id, file) in document_files(&dir)? {
                match read_document(&file) {
                    Ok(Some(data)) => documents.push((entity_id, data)),
                    Ok(None) => {}
                    Err(err) => {
                        warn!(path = %file.display(), error = %err, "skipping unreadable backup file");
                        report.skipped += 1;
                    }
                }
            }
            report.documents += documents.len();
            store.replace_namespace(&entity_type, documents)?;
            report.entity_types.push(entity_type);
        }

        info!(
            backup = %info.name,
            documents = report.documents,
            skipped = report.skipped,
            "backup restored"
        );
        Ok(report)
    }
}

fn write_snapshot<S>(
    store: &S,
    staging: &Path,
    name: &str,
    created_at: DateTime<Utc>,
) -> StorageResult<BackupInfo>
where
    S: DocumentStore + ?Sized,
{
    fs::create_dir_all(staging)?;

    let mut entity_types = BTreeMap::new();
    let mut documents = 0;
    let mut skipped = 0;
    for entity_type in store.entity_types()? {
        let namespace = staging.join(&entity_type);
        fs::create_dir_all(&namespace)?;

        let mut copied = 0;
        for entity_id in store.entity_ids(&entity_type)? {
            let data = match store.load(&entity_type, &entity_id) {
                Ok(Some(data)) => data,
                // Deleted since it was listed.
                Ok(None) => continue,
                Err(err) => {
                    warn!(
                        entity_type = %entity_type,
                        entity_id = %entity_id,
                        error = %err,
                        "skipping unreadable document in backup"
                    );
                    skipped += 1;
                    continue;
                }
            };
            let path = namespace.join(format!("{entity_id}.json"));
            fs::write(&path, serde_json::to_vec_pretty(&data)?)?;
            File::open(&path)?.sync_all()?;
            copied += 1;
        }
        sync_directory(&namespace)?;

        documents += copied;
        entity_types.insert(entity_type, copied);
    }

    let info = BackupInfo {
        format_version: BACKUP_FORMAT_VERSION,
        name: name.to_string(),
        created_at,
        entity_types,
        documents,
        skipped,
        path: PathBuf::new(),
    };
    write_atomic(&staging.join(MANIFEST_FILE), &serde_json::to_vec_pretty(&info)?)?;
    Ok(info)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FileStore, InMemoryStore};
    use serde_json::{json, Value};
    use tempfile::tempdir;

    fn populated_store(root: &Path) -> FileStore {
        let store = FileStore::open(root).unwrap();
        store.save("note", "n1", &json!({"text": "one"})).unwrap();
        store.save("note", "n2", &json!({"text": "two"})).unwrap();
        store.save("task", "t1", &json!({"done": false})).unwrap();
        store
    }

    #[test]
    fn backup_copies_every_namespace() {
        let dir = tempdir().unwrap();
        let store = populated_store(&dir.path().join("db"));
        let manager = BackupManager::new(dir.path().join("backups"));

        let info = manager.create_backup(&store, Some("snap1")).unwrap();

        assert_eq!(info.name, "snap1");
        assert_eq!(info.documents, 3);
        assert_eq!(info.entity_types.get("note"), Some(&2));
        assert_eq!(info.path, dir.path().join("backups").join("backup_snap1"));
        assert!(info.path.join("note").join("n1.json").is_file());
        assert!(info.path.join("task").join("t1.json").is_file());
        assert!(info.path.join(MANIFEST_FILE).is_file());
    }

    #[test]
    fn backup_default_name_is_timestamp() {
        let dir = tempdir().unwrap();
        let store = InMemoryStore::new();
        let manager = BackupManager::new(dir.path());

        let info = manager.create_backup(&store, None).unwrap();
        assert_eq!(info.name.len(), "20240101_120000".len());
        assert!(info.name.contains('_'));
    }

    #[test]
    fn backup_name_collision_fails() {
        let dir = tempdir().unwrap();
        let store = InMemoryStore::new();
        let manager = BackupManager::new(dir.path());

        manager.create_backup(&store, Some("same")).unwrap();
        let result = manager.create_backup(&store, Some("same"));
        assert!(matches!(result, Err(StorageError::BackupExists(_))));
    }

    #[test]
    fn backup_skips_unreadable_documents() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("db");
        let store = populated_store(&root);
        fs::write(root.join("note").join("stray.json"), b"{oops").unwrap();
        fs::write(root.join("note").join("README.txt"), b"notes").unwrap();
        let manager = BackupManager::new(dir.path().join("backups"));

        let info = manager.create_backup(&store, Some("partial")).unwrap();

        assert_eq!(info.documents, 3);
        assert_eq!(info.skipped, 1);
        assert_eq!(info.entity_types.get("note"), Some(&2));
        assert!(!info.path.join("note").join("stray.json").exists());
        assert_eq!(manager.read_info(&info.path).unwrap().skipped, 1);
    }

    /// Fails to list one namespace, after others were already copied.
    struct FailingStore {
        inner: InMemoryStore,
        broken_type: &'static str,
    }

    impl DocumentStore for FailingStore {
        fn save(&self, entity_type: &str, entity_id: &str, data: &Value) -> StorageResult<()> {
            self.inner.save(entity_type, entity_id, data)
        }

        fn load(&self, entity_type: &str, entity_id: &str) -> StorageResult<Option<Value>> {
            self.inner.load(entity_type, entity_id)
        }

        fn list_all(&self, entity_type: &str) -> StorageResult<Vec<(String, Value)>> {
            self.inner.list_all(entity_type)
        }

        fn entity_ids(&self, entity_type: &str) -> StorageResult<Vec<String>> {
            if entity_type == self.broken_type {
                return Err(std::io::Error::other("disk gone").into());
            }
            self.inner.entity_ids(entity_type)
        }

        fn delete(&self, entity_type: &str, entity_id: &str) -> StorageResult<bool> {
            self.inner.delete(entity_type, entity_id)
        }

        fn entity_types(&self) -> StorageResult<Vec<String>> {
            self.inner.entity_types()
        }

        fn replace_namespace(
            &self,
            entity_type: &str,
            documents: Vec<(String, Value)>,
        ) -> StorageResult<()> {
            self.inner.replace_namespace(entity_type, documents)
        }
    }

    #[test]
    fn failed_backup_leaves_nothing() {
        let dir = tempdir().unwrap();
        let store = FailingStore {
            inner: InMemoryStore::new(),
            broken_type: "task",
        };
        store.save("note", "n1", &json!({"text": "one"})).unwrap();
        store.save("task", "t1", &json!({"done": false})).unwrap();
        let manager = BackupManager::new(dir.path().join("backups"));

        let result = manager.create_backup(&store, Some("bad"));
        assert!(matches!(result, Err(StorageError::Io(_))));

        let leftovers: Vec<_> = fs::read_dir(manager.backups_dir()).unwrap().collect();
        assert!(leftovers.is_empty());
        assert!(manager.list_backups().unwrap().is_empty());
    }

    #[test]
    fn restore_reverts_namespaces() {
        let dir = tempdir().unwrap();
        let store = populated_store(&dir.path().join("db"));
        let manager = BackupManager::new(dir.path().join("backups"));
        let info = manager.create_backup(&store, Some("snap1")).unwrap();

        store.save("note", "n1", &json!({"text": "changed"})).unwrap();
        store.save("note", "n9", &json!({"text": "added"})).unwrap();
        store.delete("task", "t1").unwrap();
        store.save("other", "o1", &json!({})).unwrap();

        let report = manager.restore_backup(&store, &info.path).unwrap();

        assert_eq!(report.entity_types, vec!["note".to_string(), "task".to_string()]);
        assert_eq!(report.documents, 3);
        assert_eq!(store.load("note", "n1").unwrap(), Some(json!({"text": "one"})));
        assert_eq!(store.load("note", "n9").unwrap(), None);
        assert_eq!(store.load("task", "t1").unwrap(), Some(json!({"done": false})));
        // Namespaces absent from the backup are left alone.
        assert_eq!(store.load("other", "o1").unwrap(), Some(json!({})));
    }

    #[test]
    fn restore_skips_stray_files() {
        let dir = tempdir().unwrap();
        let store = populated_store(&dir.path().join("db"));
        let manager = BackupManager::new(dir.path().join("backups"));
        let info = manager.create_backup(&store, Some("snap")).unwrap();
        fs::write(info.path.join("note").join("junk.json"), b"nope").unwrap();

        let report = manager.restore_backup(&store, &info.path).unwrap();
        assert_eq!(report.skipped, 1);
        assert_eq!(report.documents, 3);
    }

    #[test]
    fn restore_missing_backup() {
        let dir = tempdir().unwrap();
        let store = InMemoryStore::new();
        let manager = BackupManager::new(dir.path());

        let result = manager.restore_backup(&store, &dir.path().join("backup_nope"));
        assert!(matches!(result, Err(StorageError::BackupNotFound(_))));

        fs::create_dir_all(dir.path().join("backup_empty")).unwrap();
        let result = manager.restore_backup(&store, &dir.path().join("backup_empty"));
        assert!(matches!(result, Err(StorageError::InvalidBackup { .. })));
    }

    #[test]
    fn list_backups_in_creation_order() {
        let dir = tempdir().unwrap();
        let store = InMemoryStore::new();
        let manager = BackupManager::new(dir.path());

        manager.create_backup(&store, Some("b")).unwrap();
        manager.create_backup(&store, Some("a")).unwrap();

        let names: Vec<_> = manager
            .list_backups()
            .unwrap()
            .into_iter()
            .map(|info| info.name)
            .collect();
        assert_eq!(names, vec!["b".to_string(), "a".to_string()]);
    }
}
