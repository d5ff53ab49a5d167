//! Crash-safe file replacement.

use crate::error::StorageResult;
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

/// Replaces `path` with `data` atomically.
///
/// Uses the write-then-rename pattern:
/// 1. Write to a temporary sibling file
/// 2. Sync the temporary file to disk
/// 3. Rename it over `path`
/// 4. Fsync the parent directory so the rename itself is durable
///
/// A crash at any point leaves either the old or the new contents at
/// `path`, never a torn write.
pub fn write_atomic(path: &Path, data: &[u8]) -> StorageResult<()> {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp_path = path.with_file_name(format!(".{file_name}.tmp"));

    let mut file = File::create(&temp_path)?;
    if let Err(err) = file.write_all(data).and_then(|()| file.sync_all()) {
        drop(file);
        let _ = fs::remove_file(&temp_path);
        return Err(err.into());
    }
    drop(file);

    fs::rename(&temp_path, path)?;

    if let Some(parent) = path.parent() {
        sync_directory(parent)?;
    }
    Ok(())
}

/// Fsyncs a directory so that entry creation, renames and deletions in it
/// are durable.
///
/// On Windows, NTFS journaling covers metadata durability and directories
/// cannot be opened for syncing, so this is a no-op there.
#[cfg(unix)]
pub fn sync_directory(path: &Path) -> StorageResult<()> {
    let dir = File::open(path)?;
    dir.sync_all()?;
    Ok(())
}

/// Fsyncs a directory (no-op on this platform).
#[cfg(not(unix))]
pub fn sync_directory(_path: &Path) -> StorageResult<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn replaces_existing_contents() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("doc.json");

        write_atomic(&path, b"first").unwrap();
        write_atomic(&path, b"second").unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"second");
    }

    #[test]
    fn leaves_no_temp_file_behind() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("doc.json");

        write_atomic(&path, b"{}").unwrap();

        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["doc.json".to_string()]);
    }
}
