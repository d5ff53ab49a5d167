//! Document store trait definition.

use crate::error::{StorageError, StorageResult};
use serde_json::Value;

/// Maximum length in bytes of an entity type or entity id.
pub const MAX_NAME_LEN: usize = 128;

/// Durable storage of one JSON document per `(entity_type, entity_id)`.
///
/// Stores are **opaque document stores**. They know nothing about change
/// tracking or sync; the sync engine layers those on top.
///
/// # Invariants
///
/// - `save` overwrites any existing document and creates the entity type's
///   namespace if it does not exist yet
/// - after `save` returns `Ok`, the document survives process termination
///   (for durable implementations)
/// - `load` returns exactly the value most recently saved
/// - implementations must be `Send + Sync` for concurrent access
///
/// # Implementors
///
/// - [`super::FileStore`] - one file per document on the local filesystem
/// - [`super::InMemoryStore`] - for tests
pub trait DocumentStore: Send + Sync {
    /// Writes `data` as the document for `(entity_type, entity_id)`.
    ///
    /// # Errors
    ///
    /// Returns an error if either name is invalid or the write fails.
    fn save(&self, entity_type: &str, entity_id: &str, data: &Value) -> StorageResult<()>;

    /// Reads a document. Returns `None` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the document exists but cannot be read or parsed.
    fn load(&self, entity_type: &str, entity_id: &str) -> StorageResult<Option<Value>>;

    /// Lists every document of one entity type as `(entity_id, data)` pairs.
    ///
    /// Callers must not rely on the order. A missing namespace yields an
    /// empty list.
    fn list_all(&self, entity_type: &str) -> StorageResult<Vec<(String, Value)>>;

    /// Lists the IDs of one entity type's documents without reading them.
    ///
    /// A missing namespace yields an empty list. Used by backups, which
    /// read documents one at a time so a single bad one can be skipped.
    fn entity_ids(&self, entity_type: &str) -> StorageResult<Vec<String>>;

    /// Removes a document. Returns `false` if it did not exist.
    fn delete(&self, entity_type: &str, entity_id: &str) -> StorageResult<bool>;

    /// Returns true if the document exists.
    fn exists(&self, entity_type: &str, entity_id: &str) -> StorageResult<bool> {
        Ok(self.load(entity_type, entity_id)?.is_some())
    }

    /// Lists the entity types that currently have a namespace.
    fn entity_types(&self) -> StorageResult<Vec<String>>;

    /// Replaces a whole namespace with `documents`.
    ///
    /// Every existing document of `entity_type` is removed first. Used by
    /// backup restore.
    fn replace_namespace(
        &self,
        entity_type: &str,
        documents: Vec<(String, Value)>,
    ) -> StorageResult<()>;
}

/// Checks that `name` can be used as an entity type or entity id.
///
/// Names become directory and file names, so anything that could escape
/// the store root or collide with internal files is rejected.
pub fn validate_name(kind: &'static str, name: &str) -> StorageResult<()> {
    let reason = if name.is_empty() {
        Some("must not be empty")
    } else if name.len() > MAX_NAME_LEN {
        Some("is too long")
    } else if name.starts_with('.') {
        Some("must not start with '.'")
    } else if name.contains(['/', '\\', '\0']) {
        Some("must not contain path separators or NUL")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(StorageError::InvalidName {
            kind,
            name: name.to_string(),
            reason,
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn accepts_plain_names() {
        assert!(validate_name("entity type", "note").is_ok());
        assert!(validate_name("entity id", "n-1_a.b").is_ok());
    }

    #[test]
    fn rejects_unsafe_names() {
        for name in ["", ".", "..", ".hidden", "a/b", "a\\b", "a\0b"] {
            assert!(
                matches!(
                    validate_name("entity id", name),
                    Err(StorageError::InvalidName { .. })
                ),
                "{name:?} should be rejected"
            );
        }
        let long = "x".repeat(MAX_NAME_LEN + 1);
        assert!(validate_name("entity id", &long).is_err());
    }

    proptest! {
        #[test]
        fn separators_are_rejected_anywhere(
            prefix in "[a-z0-9]{0,20}",
            separator in prop::sample::select(vec!['/', '\\', '\0']),
            suffix in "[a-z0-9]{0,20}",
        ) {
            let name = format!("{prefix}{separator}{suffix}");
            prop_assert!(validate_name("entity id", &name).is_err());
        }

        #[test]
        fn safe_names_are_accepted(name in "[A-Za-z0-9_-][A-Za-z0-9_.-]{0,127}") {
            prop_assert!(validate_name("entity id", &name).is_ok());
        }
    }
}
