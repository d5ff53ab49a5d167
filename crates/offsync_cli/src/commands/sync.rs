//! Status, sync and monitor commands.

use offsync_sync_engine::{SyncEngine, SyncReport, Transition};
use tracing::info;

/// Probes the remote and prints the sync status.
pub async fn status(engine: &SyncEngine, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    engine.check_connectivity().await;
    let status = engine.status();

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&status)?),
        _ => {
            println!("Sync Status");
            println!("===========");
            println!("  Remote: {}", engine.config().remote_url);
            println!("  Actor: {}", engine.actor_id());
            println!("  Online: {}", if status.is_online { "yes" } else { "no" });
            match status.last_sync_at {
                Some(at) => println!("  Last sync: {}", at.to_rfc3339()),
                None => println!("  Last sync: never"),
            }
            println!("  Pending changes: {}", status.pending_count);
            println!("  Failed changes: {}", status.failed_count);
            println!(
                "  Conflicts: {} unresolved, {} total",
                status.conflict_count,
                status.conflict_history.len()
            );
            if !status.queue.is_empty() {
                println!();
                println!("Queue");
                println!("-----");
                for (entity_type, count) in &status.queue {
                    println!("  {entity_type}: {count}");
                }
            }
        }
    }
    Ok(())
}

/// Runs one sync pass, for everything or for one entity.
pub async fn run(
    engine: &SyncEngine,
    entity: Option<(String, String)>,
) -> Result<(), Box<dyn std::error::Error>> {
    engine.check_connectivity().await;
    if !engine.is_online() {
        return Err(format!("Remote {} is not reachable", engine.config().remote_url).into());
    }

    let report = match entity {
        Some((entity_type, entity_id)) => engine.sync_entity(&entity_type, &entity_id).await?,
        None => engine.sync_all().await?,
    };
    print_report(&report);
    Ok(())
}

/// Runs the connectivity monitor until Ctrl-C.
pub async fn monitor(engine: &SyncEngine) -> Result<(), Box<dyn std::error::Error>> {
    if engine.check_connectivity().await == Transition::CameOnline {
        print_report(&engine.sync_all().await?);
    }

    let handle = engine.start_monitor();
    println!(
        "Monitoring {} every {:?} (Ctrl-C to stop)",
        engine.config().remote_url,
        engine.config().probe_interval
    );

    tokio::signal::ctrl_c().await?;
    info!("stopping monitor");
    handle.stop().await;

    let status = engine.status();
    println!("✓ Monitor stopped");
    println!("  Pending changes: {}", status.pending_count);
    println!("  Unresolved conflicts: {}", status.conflict_count);
    Ok(())
}

fn print_report(report: &SyncReport) {
    println!("✓ Sync pass finished");
    println!("  Considered: {}", report.total);
    println!("  Synced: {}", report.synced);
    println!("  Failed: {}", report.failed);
    println!("  Conflicts: {}", report.conflicts);
    println!("  Deferred: {}", report.deferred);
}
