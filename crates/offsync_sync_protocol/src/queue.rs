//! Ordered queue of change records awaiting delivery.

use crate::change::{ChangeRecord, SyncState};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Change records grouped by entity type.
///
/// Within a group, records stay in the order they were enqueued, which is
/// also `created_at` order for a single engine.
///
/// # Invariants
///
/// - Records are never reordered
/// - A record's ID appears at most once
/// - Empty groups are removed
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChangeQueue {
    groups: BTreeMap<String, Vec<ChangeRecord>>,
}

impl ChangeQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a change and returns its ID.
    pub fn enqueue(&mut self, change: ChangeRecord) -> String {
        let id = change.id.clone();
        self.groups
            .entry(change.entity_type.clone())
            .or_default()
            .push(change);
        id
    }

    /// Returns the change with the given ID.
    pub fn get(&self, id: &str) -> Option<&ChangeRecord> {
        self.iter().find(|change| change.id == id)
    }

    /// Returns a mutable reference to the change with the given ID.
    pub fn get_mut(&mut self, id: &str) -> Option<&mut ChangeRecord> {
        self.groups
            .values_mut()
            .flat_map(|group| group.iter_mut())
            .find(|change| change.id == id)
    }

    /// Removes the change with the given ID.
    pub fn remove(&mut self, id: &str) -> Option<ChangeRecord> {
        let (entity_type, index) = self.groups.iter().find_map(|(entity_type, group)| {
            group
                .iter()
                .position(|change| change.id == id)
                .map(|index| (entity_type.clone(), index))
        })?;

        let group = self.groups.get_mut(&entity_type)?;
        let removed = group.remove(index);
        if group.is_empty() {
            self.groups.remove(&entity_type);
        }
        Some(removed)
    }

    /// Iterates over all changes, grouped by entity type.
    pub fn iter(&self) -> impl Iterator<Item = &ChangeRecord> {
        self.groups.values().flatten()
    }

    /// Returns all changes across every entity type.
    pub fn pending(&self) -> Vec<&ChangeRecord> {
        self.iter().collect()
    }

    /// Returns the changes for one entity type, oldest first.
    pub fn for_type(&self, entity_type: &str) -> &[ChangeRecord] {
        self.groups
            .get(entity_type)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Returns the changes for one entity, oldest first.
    pub fn for_entity(&self, entity_type: &str, entity_id: &str) -> Vec<&ChangeRecord> {
        self.for_type(entity_type)
            .iter()
            .filter(|change| change.entity_id == entity_id)
            .collect()
    }

    /// Returns the oldest change for an entity.
    ///
    /// Later changes to the same entity must wait for this one.
    pub fn head_for_entity(&self, entity_type: &str, entity_id: &str) -> Option<&ChangeRecord> {
        self.for_type(entity_type)
            .iter()
            .find(|change| change.entity_id == entity_id)
    }

    /// Returns the entity types that have queued changes.
    pub fn entity_types(&self) -> Vec<String> {
        self.groups.keys().cloned().collect()
    }

    /// Returns the number of queued changes.
    pub fn len(&self) -> usize {
        self.groups.values().map(Vec::len).sum()
    }

    /// Returns true if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Returns the number of queued changes in `state`.
    pub fn count_in_state(&self, state: SyncState) -> usize {
        self.iter().filter(|change| change.state == state).count()
    }

    /// Returns queued change counts keyed by entity type.
    pub fn counts_by_type(&self) -> BTreeMap<String, usize> {
        self.groups
            .iter()
            .map(|(entity_type, group)| (entity_type.clone(), group.len()))
            .collect()
    }

    /// Returns in-flight changes to pending.
    ///
    /// Used when loading a queue left behind by an interrupted process.
    /// Returns the number of changes reset.
    pub fn reset_in_flight(&mut self) -> usize {
        let mut reset = 0;
        for change in self.groups.values_mut().flatten() {
            if change.state == SyncState::Syncing {
                change.requeue();
                reset += 1;
            }
        }
        reset
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn note(id: &str, text: &str) -> ChangeRecord {
        ChangeRecord::update("note", id, json!({ "text": text }), "dev-1")
    }

    #[test]
    fn enqueue_preserves_order() {
        let mut queue = ChangeQueue::new();
        let a = queue.enqueue(note("n1", "a"));
        let b = queue.enqueue(note("n1", "b"));
        let c = queue.enqueue(note("n2", "c"));

        let ids: Vec<_> = queue.for_entity("note", "n1").iter().map(|c| c.id.clone()).collect();
        assert_eq!(ids, vec![a.clone(), b]);
        assert_eq!(queue.head_for_entity("note", "n1").unwrap().id, a);
        assert_eq!(queue.head_for_entity("note", "n2").unwrap().id, c);
        assert_eq!(queue.len(), 3);
    }

    #[test]
    fn remove_drops_empty_groups() {
        let mut queue = ChangeQueue::new();
        let id = queue.enqueue(note("n1", "a"));
        queue.enqueue(ChangeRecord::delete("task", "t1", "dev-1"));

        assert_eq!(queue.entity_types(), vec!["note", "task"]);
        assert!(queue.remove(&id).is_some());
        assert!(queue.remove(&id).is_none());
        assert_eq!(queue.entity_types(), vec!["task"]);
    }

    #[test]
    fn reset_in_flight_requeues_syncing() {
        let mut queue = ChangeQueue::new();
        let a = queue.enqueue(note("n1", "a"));
        let b = queue.enqueue(note("n2", "b"));
        queue.get_mut(&a).unwrap().mark_syncing();
        queue.get_mut(&b).unwrap().mark_conflict();

        assert_eq!(queue.reset_in_flight(), 1);
        assert_eq!(queue.get(&a).unwrap().state, SyncState::Pending);
        assert_eq!(queue.get(&b).unwrap().state, SyncState::Conflict);
        assert_eq!(queue.count_in_state(SyncState::Pending), 1);
    }

    #[test]
    fn serializes_grouped_by_type() {
        let mut queue = ChangeQueue::new();
        queue.enqueue(note("n1", "a"));
        queue.enqueue(ChangeRecord::delete("task", "t1", "dev-1"));

        let value = serde_json::to_value(&queue).unwrap();
        assert_eq!(value["note"].as_array().unwrap().len(), 1);
        assert_eq!(value["task"][0]["kind"], "delete");

        let back: ChangeQueue = serde_json::from_value(value).unwrap();
        assert_eq!(back, queue);
    }
}
