//! Content hashing of entity payloads.

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Returns the canonical JSON encoding of `value`.
///
/// Object keys are sorted recursively and no insignificant whitespace is
/// emitted, so two values that differ only in field order encode to the
/// same string.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (key, item)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(item, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// Returns the lowercase hex SHA-256 of the canonical encoding of `value`.
pub fn content_hash(value: &Value) -> String {
    let digest = Sha256::digest(canonical_json(value).as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;
    use std::collections::BTreeMap;

    #[test]
    fn canonical_sorts_nested_keys() {
        let value = json!({"b": 1, "a": {"d": [true, null], "c": "x"}});
        assert_eq!(
            canonical_json(&value),
            r#"{"a":{"c":"x","d":[true,null]},"b":1}"#
        );
    }

    #[test]
    fn hash_is_hex_sha256() {
        let hash = content_hash(&json!({"text": "hello"}));
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn hash_distinguishes_values() {
        assert_ne!(
            content_hash(&json!({"text": "hello"})),
            content_hash(&json!({"text": "goodbye"}))
        );
        assert_ne!(content_hash(&json!([1, 2])), content_hash(&json!([2, 1])));
    }

    type Fields = BTreeMap<String, (i64, BTreeMap<String, i64>)>;

    fn fields() -> impl Strategy<Value = Fields> {
        prop::collection::btree_map(
            "[a-z]{1,8}",
            (
                any::<i64>(),
                prop::collection::btree_map("[a-z]{1,4}", any::<i64>(), 0..4),
            ),
            0..8,
        )
    }

    /// Writes `fields` as JSON text with the given key order at every level.
    fn object_text(fields: &Fields, reverse: bool) -> String {
        let mut entries: Vec<String> = fields
            .iter()
            .map(|(key, (n, inner))| {
                let mut nested: Vec<String> =
                    inner.iter().map(|(k, v)| format!("\"{k}\": {v}")).collect();
                if reverse {
                    nested.reverse();
                }
                let number = format!("\"n\": {n}");
                let nested = format!("\"inner\": {{{}}}", nested.join(", "));
                let body = if reverse {
                    format!("{number}, {nested}")
                } else {
                    format!("{nested}, {number}")
                };
                format!("\"{key}\": {{{body}}}")
            })
            .collect();
        if reverse {
            entries.reverse();
        }
        format!("{{{}}}", entries.join(", "))
    }

    fn sorted_text(fields: &Fields) -> String {
        let entries: Vec<String> = fields
            .iter()
            .map(|(key, (n, inner))| {
                let inner: Vec<String> = inner.iter().map(|(k, v)| format!("\"{k}\":{v}")).collect();
                format!("\"{key}\":{{\"inner\":{{{}}},\"n\":{n}}}", inner.join(","))
            })
            .collect();
        format!("{{{}}}", entries.join(","))
    }

    proptest! {
        #[test]
        fn hash_ignores_field_order(fields in fields()) {
            let forward: Value = serde_json::from_str(&object_text(&fields, false)).unwrap();
            let reversed: Value = serde_json::from_str(&object_text(&fields, true)).unwrap();

            prop_assert_eq!(content_hash(&forward), content_hash(&reversed));
            prop_assert_eq!(canonical_json(&reversed), sorted_text(&fields));
        }
    }
}
