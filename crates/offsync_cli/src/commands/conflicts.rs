//! Change history and conflict commands.

use offsync_sync_engine::{ResolutionOutcome, SyncEngine};
use offsync_sync_protocol::{ChangeRecord, ConflictRecord, ConflictResolution};

/// Prints the queued changes of an entity, newest first.
pub fn history(
    engine: &SyncEngine,
    entity_type: &str,
    entity_id: &str,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let changes = engine.version_history(entity_type, entity_id);

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&changes)?),
        _ => {
            if changes.is_empty() {
                println!("No queued changes for {entity_type}/{entity_id}");
            }
            for change in &changes {
                print_change(change);
            }
        }
    }
    Ok(())
}

/// Lists unresolved conflicts, or every conflict with `all`.
pub fn list(engine: &SyncEngine, all: bool, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let conflicts = if all {
        engine.conflicts()
    } else {
        engine.unresolved_conflicts()
    };

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&conflicts)?),
        _ => {
            if conflicts.is_empty() {
                println!("No conflicts");
            }
            for conflict in &conflicts {
                print_conflict(engine, conflict);
            }
        }
    }
    Ok(())
}

/// Resolves a conflict with an explicit winner, or by last-write-wins.
pub async fn resolve(
    engine: &SyncEngine,
    conflict_id: &str,
    resolution: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    let resolution: ConflictResolution = match resolution {
        Some(resolution) => resolution.parse()?,
        None => {
            let conflict = engine
                .conflict(conflict_id)
                .ok_or_else(|| format!("No conflict {conflict_id}"))?;
            engine.resolve_auto(&conflict).resolution().ok_or(
                "Last-write-wins cannot decide this conflict; pass local_wins or remote_wins",
            )?
        }
    };

    engine.check_connectivity().await;
    let outcome = engine.resolve_manual(conflict_id, resolution).await?;

    println!("✓ Conflict {conflict_id} resolved: {resolution}");
    match outcome {
        ResolutionOutcome::RemoteApplied => println!("  Local entity replaced by remote version"),
        ResolutionOutcome::Requeued => println!("  Local change queued for the next sync"),
        ResolutionOutcome::Retransmitted(outcome) => {
            println!("  Local change sent again: {outcome:?}")
        }
    }
    Ok(())
}

fn print_change(change: &ChangeRecord) {
    println!("{} [{}]", change.id, change.state);
    println!("  Kind: {}", change.kind);
    println!("  Created: {}", change.created_at.to_rfc3339());
    println!("  Attempts: {}", change.attempts);
    if let Some(at) = change.next_attempt_at {
        println!("  Next attempt: {}", at.to_rfc3339());
    }
    if let Some(err) = &change.last_error {
        println!("  Last error: {err}");
    }
}

fn print_conflict(engine: &SyncEngine, conflict: &ConflictRecord) {
    println!(
        "{} {}/{}",
        conflict.id, conflict.entity_type, conflict.entity_id
    );
    println!("  Detected: {}", conflict.detected_at.to_rfc3339());
    println!("  Local change: {}", conflict.local_change.created_at.to_rfc3339());
    match conflict.remote_updated_at {
        Some(at) => println!("  Remote updated: {}", at.to_rfc3339()),
        None => println!("  Remote updated: unknown"),
    }
    match (conflict.resolution, conflict.resolved_by) {
        (Some(resolution), Some(by)) => println!("  Resolved: {resolution} ({by:?})"),
        _ => println!(
            "  Last-write-wins suggests: {:?}",
            engine.resolve_auto(conflict)
        ),
    }
}
