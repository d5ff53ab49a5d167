//! In-memory document store for testing.

use crate::error::StorageResult;
use crate::store::{validate_name, DocumentStore};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::BTreeMap;

/// An in-memory document store.
///
/// This store keeps all documents in memory and is suitable for:
/// - Unit tests
/// - Integration tests
/// - Ephemeral engines that don't need persistence
///
/// It applies the same name validation as [`super::FileStore`] so tests
/// catch invalid identifiers.
///
/// # Example
///
/// ```rust
/// use offsync_storage::{DocumentStore, InMemoryStore};
/// use serde_json::json;
///
/// let store = InMemoryStore::new();
/// store.save("note", "n1", &json!({"text": "hi"})).unwrap();
/// assert_eq!(store.document_count(), 1);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryStore {
    namespaces: RwLock<BTreeMap<String, BTreeMap<String, Value>>>,
}

impl InMemoryStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of documents across all namespaces.
    #[must_use]
    pub fn document_count(&self) -> usize {
        self.namespaces.read().values().map(BTreeMap::len).sum()
    }

    /// Removes every document.
    pub fn clear(&self) {
        self.namespaces.write().clear();
    }
}

impl DocumentStore for InMemoryStore {
    fn save(&self, entity_type: &str, entity_id: &str, data: &Value) -> StorageResult<()> {
        validate_name("entity type", entity_type)?;
        validate_name("entity id", entity_id)?;
        self.namespaces
            .write()
            .entry(entity_type.to_string())
            .or_default()
            .insert(entity_id.to_string(), data.clone());
        Ok(())
    }

    fn load(&self, entity_type: &str, entity_id: &str) -> StorageResult<Option<Value>> {
        Ok(self
            .namespaces
            .read()
            .get(entity_type)
            .and_then(|docs| docs.get(entity_id))
            .cloned())
    }

    fn list_all(&self, entity_type: &str) -> StorageResult<Vec<(String, Value)>> {
        Ok(self
            .namespaces
            .read()
            .get(entity_type)
            .map(|docs| {
                docs.iter()
                    .map(|(id, data)| (id.clone(), data.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    fn entity_ids(&self, entity_type: &str) -> StorageResult<Vec<String>> {
        Ok(self
            .namespaces
            .read()
            .get(entity_type)
            .map(|docs| docs.keys().cloned().collect())
            .unwrap_or_default())
    }

    fn delete(&self, entity_type: &str, entity_id: &str) -> StorageResult<bool> {
        Ok(self
            .namespaces
            .write()
            .get_mut(entity_type)
            .and_then(|docs| docs.remove(entity_id))
            .is_some())
    }

    fn entity_types(&self) -> StorageResult<Vec<String>> {
        Ok(self.namespaces.read().keys().cloned().collect())
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
        self.namespaces
            .write()
            .insert(entity_type.to_string(), documents.into_iter().collect());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn memory_save_load_delete() {
        let store = InMemoryStore::new();

        store.save("task", "t1", &json!({"done": false})).unwrap();
        assert!(store.exists("task", "t1").unwrap());
        assert_eq!(
            store.load("task", "t1").unwrap(),
            Some(json!({"done": false}))
        );

        assert!(store.delete("task", "t1").unwrap());
        assert!(!store.delete("task", "t1").unwrap());
        assert_eq!(store.load("task", "t1").unwrap(), None);
    }

    #[test]
    fn memory_replace_namespace() {
        let store = InMemoryStore::new();
        store.save("task", "t1", &json!(1)).unwrap();
        store.save("note", "n1", &json!(2)).unwrap();

        store
            .replace_namespace("task", vec![("t2".to_string(), json!(3))])
            .unwrap();

        assert_eq!(store.list_all("task").unwrap(), vec![("t2".to_string(), json!(3))]);
        assert_eq!(store.load("note", "n1").unwrap(), Some(json!(2)));
        assert_eq!(store.document_count(), 2);
    }
}
