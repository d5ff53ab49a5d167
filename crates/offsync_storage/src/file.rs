//! File-based document store for persistent storage.

use crate::atomic::{sync_directory, write_atomic};
use crate::error::{StorageError, StorageResult};
use crate::store::{validate_name, DocumentStore};
use fs2::FileExt;
use parking_lot::Mutex;
use serde_json::Value;
use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Advisory lock file for single-process access.
const LOCK_FILE: &str = "LOCK";
/// Extension of document files.
const DOC_EXTENSION: &str = "json";

/// A document store backed by the local filesystem.
///
/// Layout:
///
/// ```text
/// <root>/
/// ├─ LOCK                 # Advisory lock for single-process access
/// ├─ note/                # One namespace per entity type
/// │  ├─ n1.json           # One document per entity id
/// │  └─ n2.json
/// └─ task/
///    └─ t1.json
/// ```
///
/// # Durability
///
/// Every write goes through [`write_atomic`]: temp file, `sync_all`,
/// rename, directory fsync. A document that `save` reported as written
/// survives a crash.
///
/// # Thread Safety
///
/// Mutations are serialized by an internal lock; reads are lock-free.
///
/// # Example
///
/// ```no_run
/// use offsync_storage::{DocumentStore, FileStore};
/// use serde_json::json;
/// use std::path::Path;
///
/// let store = FileStore::open(Path::new("data/local_db")).unwrap();
/// store.save("note", "n1", &json!({"text": "hello"})).unwrap();
/// assert!(store.exists("note", "n1").unwrap());
/// ```
#[derive(Debug)]
pub struct FileStore {
    root: PathBuf,
    write_lock: Mutex<()>,
    _lock_file: File,
}

impl FileStore {
    /// Opens or creates a store rooted at `root`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Locked`] if another process holds the store,
    /// or an I/O error if the directory cannot be created.
    pub fn open(root: &Path) -> StorageResult<Self> {
        fs::create_dir_all(root)?;

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(root.join(LOCK_FILE))?;

        if lock_file.try_lock_exclusive().is_err() {
            return Err(StorageError::Locked(root.to_path_buf()));
        }

        Ok(Self {
            root: root.to_path_buf(),
            write_lock: Mutex::new(()),
            _lock_file: lock_file,
        })
    }

    /// Returns the store root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the namespace directory of an entity type.
    #[must_use]
    pub fn namespace_dir(&self, entity_type: &str) -> PathBuf {
        self.root.join(entity_type)
    }

    fn document_path(&self, entity_type: &str, entity_id: &str) -> PathBuf {
        self.namespace_dir(entity_type)
            .join(format!("{entity_id}.{DOC_EXTENSION}"))
    }
}

/// Reads and parses one document file.
pub(crate) fn read_document(path: &Path) -> StorageResult<Option<Value>> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|e| StorageError::corrupted(path, e.to_string()))
}

/// Lists the document files of a namespace directory as `(entity_id, path)`.
///
/// Hidden files (including in-flight temp files) are skipped silently;
/// files with other extensions are logged and skipped.
pub(crate) fn document_files(dir: &Path) -> StorageResult<Vec<(String, PathBuf)>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err.into()),
    };

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        if !entry.file_type()?.is_file() {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        if stem.starts_with('.') {
            continue;
        }
        if path.extension().and_then(|e| e.to_str()) != Some(DOC_EXTENSION) {
            warn!(path = %path.display(), "skipping stray file in namespace");
            continue;
        }
        files.push((stem.to_string(), path));
    }
    files.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(files)
}

impl DocumentStore for FileStore {
    fn save(&self, entity_type: &str, entity_id: &str, data: &Value) -> StorageResult<()> {
        validate_name("entity type", entity_type)?;
        validate_name("entity id", entity_id)?;

        let bytes = serde_json::to_vec_pretty(data)?;

        let _guard = self.write_lock.lock();
        let dir = self.namespace_dir(entity_type);
        if !dir.exists() {
            fs::create_dir_all(&dir)?;
            sync_directory(&self.root)?;
        }
        write_atomic(&self.document_path(entity_type, entity_id), &bytes)
    }

    fn load(&self, entity_type: &str, entity_id: &str) -> StorageResult<Option<Value>> {
        validate_name("entity type", entity_type)?;
        validate_name("entity id", entity_id)?;
        read_document(&self.document_path(entity_type, entity_id))
    }

    fn list_all(&self, entity_type: &str) -> StorageResult<Vec<(String, Value)>> {
        validate_name("entity type", entity_type)?;

        let mut documents = Vec::new();
        for (entity_id, path) in document_files(&self.namespace_dir(entity_type))? {
            // A concurrent delete can remove the file between listing and reading.
            if let Some(data) = read_document(&path)? {
                documents.push((entity_id, data));
            }
        }
        Ok(documents)
    }

    fn entity_ids(&self, entity_type: &str) -> StorageResult<Vec<String>> {
        validate_name("entity type", entity_type)?;
        Ok(document_files(&self.namespace_dir(entity_type))?
            .into_iter()
            .map(|(entity_id, _)| entity_id)
            .collect())
    }

    fn delete(&self, entity_type: &str, entity_id: &str) -> StorageResult<bool> {
        validate_name("entity type", entity_type)?;
        validate_name("entity id", entity_id)?;

        let _guard = self.write_lock.lock();
        let path = self.document_path(entity_type, entity_id);
        match fs::remove_file(&path) {
            Ok(()) => {
                sync_directory(&self.namespace_dir(entity_type))?;
                Ok(true)
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    fn exists(&self, entity_type: &str, entity_id: &str) -> StorageResult<bool> {
        validate_name("entity type", entity_type)?;
        validate_name("entity id", entity_id)?;
        Ok(self.document_path(entity_type, entity_id).is_file())
    }

    fn entity_types(&self) -> StorageResult<Vec<String>> {
        let mut types = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if validate_name("entity type", &name).is_ok() {
                types.push(name);
            }
        }
        types.sort();
        Ok(types)
    }

    fn replace_namespace(
        &self,
        entity_type: &str,
        documents: Vec<(String, Value)>,
    ) -> StorageResult<()> {
        validate_name("entity type", entity_type)?;
        for (entity_id, _) in &documents {
            validate_name("entity id", entity_id)?;
        }

        let _guard = self.write_lock.lock();

        // Build the replacement next to the live namespace, then swap.
        let staging = self.root.join(format!(".{entity_type}.restore"));
        if staging.exists() {
            fs::remove_dir_all(&staging)?;
        }
        fs::create_dir_all(&staging)?;
        for (entity_id, data) in &documents {
            let path = staging.join(format!("{entity_id}.{DOC_EXTENSION}"));
            fs::write(&path, serde_json::to_vec_pretty(data)?)?;
            File::open(&path)?.sync_all()?;
        }
        sync_directory(&staging)?;

        let live = self.namespace_dir(entity_type);
        if live.exists() {
            fs::remove_dir_all(&live)?;
        }
        fs::rename(&staging, &live)?;
        sync_directory(&self.root)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn save_creates_namespace() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();

        store.save("note", "n1", &json!({"text": "hello"})).unwrap();

        assert!(dir.path().join("note").join("n1.json").is_file());
        assert_eq!(store.entity_types().unwrap(), vec!["note".to_string()]);
    }

    #[test]
    fn save_and_load() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();

        let data = json!({"text": "hello", "tags": ["a", "b"], "n": 3});
        store.save("note", "n1", &data).unwrap();

        assert_eq!(store.load("note", "n1").unwrap(), Some(data));
        assert_eq!(store.load("note", "missing").unwrap(), None);
        assert_eq!(store.load("other", "n1").unwrap(), None);
    }

    #[test]
    fn save_overwrites() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();

        store.save("note", "n1", &json!({"v": 1})).unwrap();
        store.save("note", "n1", &json!({"v": 2})).unwrap();

        assert_eq!(store.load("note", "n1").unwrap(), Some(json!({"v": 2})));
        assert_eq!(store.list_all("note").unwrap().len(), 1);
    }

    #[test]
    fn file_persistence() {
        let dir = tempdir().unwrap();

        {
            let store = FileStore::open(dir.path()).unwrap();
            store.save("note", "n1", &json!({"text": "durable"})).unwrap();
        }

        {
            let store = FileStore::open(dir.path()).unwrap();
            assert_eq!(
                store.load("note", "n1").unwrap(),
                Some(json!({"text": "durable"}))
            );
        }
    }

    #[test]
    fn lock_prevents_second_open() {
        let dir = tempdir().unwrap();
        let _store = FileStore::open(dir.path()).unwrap();

        let result = FileStore::open(dir.path());
        assert!(matches!(result, Err(StorageError::Locked(_))));
    }

    #[test]
    fn list_all_skips_foreign_files() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();

        store.save("note", "a", &json!(1)).unwrap();
        store.save("note", "b", &json!(2)).unwrap();
        fs::write(dir.path().join("note").join("README.txt"), b"x").unwrap();
        fs::write(dir.path().join("note").join(".c.json.tmp"), b"x").unwrap();

        let mut listed = store.list_all("note").unwrap();
        listed.sort_by(|a, b| a.0.cmp(&b.0));
        assert_eq!(
            listed,
            vec![("a".to_string(), json!(1)), ("b".to_string(), json!(2))]
        );
        assert!(store.list_all("empty").unwrap().is_empty());
    }

    #[test]
    fn delete_reports_presence() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();

        store.save("note", "n1", &json!({})).unwrap();
        assert!(store.delete("note", "n1").unwrap());
        assert!(!store.delete("note", "n1").unwrap());
        assert!(!store.exists("note", "n1").unwrap());
    }

    #[test]
    fn corrupted_document_is_reported() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();

        store.save("note", "n1", &json!({})).unwrap();
        fs::write(dir.path().join("note").join("n1.json"), b"{not json").unwrap();

        let result = store.load("note", "n1");
        assert!(matches!(result, Err(StorageError::Corrupted { .. })));
    }

    #[test]
    fn invalid_names_rejected() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();

        let result = store.save("../escape", "n1", &json!({}));
        assert!(matches!(result, Err(StorageError::InvalidName { .. })));
    }

    #[test]
    fn replace_namespace_is_wholesale() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();

        store.save("note", "old", &json!({"v": 0})).unwrap();
        store.save("note", "kept", &json!({"v": 1})).unwrap();

        store
            .replace_namespace(
                "note",
                vec![
                    ("kept".to_string(), json!({"v": 10})),
                    ("new".to_string(), json!({"v": 20})),
                ],
            )
            .unwrap();

        assert_eq!(store.load("note", "old").unwrap(), None);
        assert_eq!(store.load("note", "kept").unwrap(), Some(json!({"v": 10})));
        assert_eq!(store.load("note", "new").unwrap(), Some(json!({"v": 20})));
        assert!(!dir.path().join(".note.restore").exists());
    }
}
