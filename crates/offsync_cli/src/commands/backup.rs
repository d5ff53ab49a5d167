//! Backup and restore commands.

use offsync_sync_engine::SyncEngine;
use std::path::{Path, PathBuf};
use tracing::info;

/// Backs up the local store.
pub fn create(engine: &SyncEngine, name: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    let backup = engine.create_backup(name)?;

    println!("✓ Backup created successfully");
    println!("  Name: {}", backup.name);
    println!("  Path: {:?}", backup.path);
    println!("  Documents: {}", backup.documents);
    if backup.skipped > 0 {
        println!("  Unreadable documents skipped: {}", backup.skipped);
    }
    for (entity_type, count) in &backup.entity_types {
        println!("    {entity_type}: {count}");
    }
    Ok(())
}

/// Lists backups, oldest first.
pub fn list(engine: &SyncEngine) -> Result<(), Box<dyn std::error::Error>> {
    let backups = engine.list_backups()?;
    if backups.is_empty() {
        println!("No backups");
    }
    for backup in backups {
        println!(
            "{}  {}  {} documents",
            backup.name,
            backup.created_at.to_rfc3339(),
            backup.documents
        );
    }
    Ok(())
}

/// Restores the local store from a backup name or directory.
///
/// Queued changes are kept; they are still delivered on the next sync.
pub fn restore(engine: &SyncEngine, backup: &str) -> Result<(), Box<dyn std::error::Error>> {
    let path = resolve_backup_path(engine, backup);
    info!("Restoring local store from {:?}", path);

    let report = engine.restore_backup(&path)?;

    println!("✓ Local store restored successfully");
    println!("  From: {:?}", path);
    println!("  Entity types: {}", report.entity_types.join(", "));
    println!("  Documents restored: {}", report.documents);
    if report.skipped > 0 {
        println!("  Unreadable files skipped: {}", report.skipped);
    }
    let pending = engine.change_log().pending_count();
    if pending > 0 {
        println!("  Pending changes kept: {pending}");
    }
    Ok(())
}

fn resolve_backup_path(engine: &SyncEngine, backup: &str) -> PathBuf {
    let as_path = Path::new(backup);
    if as_path.is_dir() {
        as_path.to_path_buf()
    } else {
        engine.backup_path(backup)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use offsync_storage::InMemoryStore;
    use offsync_sync_engine::{MockRemote, SyncConfig};
    use std::sync::Arc;

    #[test]
    fn backup_names_and_paths_both_resolve() {
        let dir = tempfile::tempdir().unwrap();
        let config = SyncConfig::new("http://remote.test", dir.path()).with_actor_id("cli");
        let engine = SyncEngine::with_parts(
            config,
            Arc::new(InMemoryStore::new()),
            Arc::new(MockRemote::offline()),
        )
        .unwrap();

        let info = engine.create_backup(Some("nightly")).unwrap();
        assert_eq!(resolve_backup_path(&engine, "nightly"), info.path);
        assert_eq!(
            resolve_backup_path(&engine, info.path.to_str().unwrap()),
            info.path
        );
    }
}
