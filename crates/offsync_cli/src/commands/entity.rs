//! Local entity commands.

use offsync_sync_engine::SyncEngine;
use serde_json::Value;

/// Saves an entity from a JSON string.
pub fn put(
    engine: &SyncEngine,
    entity_type: &str,
    entity_id: &str,
    data: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let data: Value =
        serde_json::from_str(data).map_err(|err| format!("Entity content is not valid JSON: {err}"))?;
    let change_id = engine.save(entity_type, entity_id, data)?;

    println!("✓ Saved {entity_type}/{entity_id}");
    println!("  Change: {change_id}");
    println!("  Pending changes: {}", engine.change_log().pending_count());
    Ok(())
}

/// Prints an entity as pretty JSON.
pub fn get(
    engine: &SyncEngine,
    entity_type: &str,
    entity_id: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    match engine.load(entity_type, entity_id)? {
        Some(data) => {
            println!("{}", serde_json::to_string_pretty(&data)?);
            Ok(())
        }
        None => Err(format!("No entity {entity_type}/{entity_id}").into()),
    }
}

/// Lists the entities of one type, or a summary of every type.
pub fn list(
    engine: &SyncEngine,
    entity_type: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    match entity_type {
        Some(entity_type) => {
            let entities = engine.list(entity_type)?;
            println!("{entity_type} ({} entities)", entities.len());
            for (entity_id, data) in entities {
                println!("  {entity_id}: {}", serde_json::to_string(&data)?);
            }
        }
        None => {
            let types = engine.entity_types()?;
            if types.is_empty() {
                println!("No entities stored");
            }
            for entity_type in types {
                println!("{entity_type}: {} entities", engine.list(&entity_type)?.len());
            }
        }
    }
    Ok(())
}

/// Deletes an entity.
pub fn delete(
    engine: &SyncEngine,
    entity_type: &str,
    entity_id: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    if engine.delete(entity_type, entity_id)? {
        println!("✓ Deleted {entity_type}/{entity_id}");
        Ok(())
    } else {
        Err(format!("No entity {entity_type}/{entity_id}").into())
    }
}
