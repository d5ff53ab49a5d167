//! Mapping between change records and remote requests.
//!
//! The remote speaks plain REST over JSON:
//!
//! | Change | Request |
//! |--------|---------|
//! | create | `POST /api/{type}` |
//! | update | `PUT /api/{type}/{id}` |
//! | delete | `DELETE /api/{type}/{id}` |
//!
//! Every request body is a [`ChangeEnvelope`].

use crate::change::{ChangeKind, ChangeRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Prefix for entity routes.
pub const API_PREFIX: &str = "/api";

/// Route probed by the connectivity monitor.
pub const HEALTH_PATH: &str = "/health";

/// HTTP method used for a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteMethod {
    /// Create.
    Post,
    /// Update.
    Put,
    /// Delete.
    Delete,
}

impl RemoteMethod {
    /// Returns the method name.
    pub fn as_str(&self) -> &'static str {
        match self {
            RemoteMethod::Post => "POST",
            RemoteMethod::Put => "PUT",
            RemoteMethod::Delete => "DELETE",
        }
    }
}

impl fmt::Display for RemoteMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Body sent with every change request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEnvelope {
    /// Entity ID, so creates posted to the collection route carry it.
    pub id: String,
    /// Entity content; `null` for deletes.
    pub data: Value,
    /// Originating device.
    pub actor_id: String,
    /// Local modification time, used by the remote for last-write-wins.
    pub timestamp: DateTime<Utc>,
    /// Content hash of `data`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
}

/// A request ready to be sent to the remote.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteRequest {
    /// HTTP method.
    pub method: RemoteMethod,
    /// Path relative to the remote base URL, percent-encoded.
    pub path: String,
    /// Request body.
    pub body: ChangeEnvelope,
}

impl RemoteRequest {
    /// Builds the request that delivers `change`.
    pub fn for_change(change: &ChangeRecord) -> Self {
        let collection = format!(
            "{API_PREFIX}/{}",
            urlencoding::encode(&change.entity_type)
        );
        let (method, path) = match change.kind {
            ChangeKind::Create => (RemoteMethod::Post, collection),
            ChangeKind::Update => (
                RemoteMethod::Put,
                format!("{collection}/{}", urlencoding::encode(&change.entity_id)),
            ),
            ChangeKind::Delete => (
                RemoteMethod::Delete,
                format!("{collection}/{}", urlencoding::encode(&change.entity_id)),
            ),
        };

        Self {
            method,
            path,
            body: ChangeEnvelope {
                id: change.entity_id.clone(),
                data: change.payload.clone(),
                actor_id: change.actor_id.clone(),
                timestamp: change.created_at,
                hash: change.content_hash.clone(),
            },
        }
    }

    /// Joins the request path onto a base URL.
    pub fn url(&self, base_url: &str) -> String {
        join_url(base_url, &self.path)
    }
}

/// Joins `path` onto `base_url` with exactly one slash between them.
pub fn join_url(base_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// How the remote answered a change request.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteOutcome {
    /// 2xx: the change is stored remotely.
    Accepted,
    /// 409: the remote holds a conflicting version.
    Conflict {
        /// Remote representation, if the body was valid JSON.
        snapshot: Option<Value>,
    },
    /// Any other status.
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Response body, for diagnostics.
        body: String,
    },
}

impl RemoteOutcome {
    /// Classifies a response by status code.
    pub fn classify(status: u16, body: &[u8]) -> Self {
        match status {
            200..=299 => RemoteOutcome::Accepted,
            409 => RemoteOutcome::Conflict {
                snapshot: serde_json::from_slice(body).ok(),
            },
            _ => RemoteOutcome::Rejected {
                status,
                body: String::from_utf8_lossy(body).into_owned(),
            },
        }
    }
}

/// Returns true if a failed status is worth retrying.
///
/// Server errors, timeouts and throttling are transient; other 4xx
/// statuses are not.
pub fn is_retryable_status(status: u16) -> bool {
    status >= 500 || status == 408 || status == 429
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn create_posts_to_collection() {
        let change = ChangeRecord::create("note", "n1", json!({"text": "a"}), "dev-1");
        let request = RemoteRequest::for_change(&change);

        assert_eq!(request.method, RemoteMethod::Post);
        assert_eq!(request.path, "/api/note");
        assert_eq!(request.body.id, "n1");
        assert_eq!(request.body.data, json!({"text": "a"}));
        assert_eq!(request.body.actor_id, "dev-1");
        assert_eq!(request.body.timestamp, change.created_at);
        assert_eq!(request.body.hash, change.content_hash);
    }

    #[test]
    fn update_and_delete_target_entity() {
        let update = ChangeRecord::update("note", "n1", json!({}), "dev-1");
        let delete = ChangeRecord::delete("note", "n1", "dev-1");

        let update = RemoteRequest::for_change(&update);
        let delete = RemoteRequest::for_change(&delete);

        assert_eq!((update.method, update.path.as_str()), (RemoteMethod::Put, "/api/note/n1"));
        assert_eq!(
            (delete.method, delete.path.as_str()),
            (RemoteMethod::Delete, "/api/note/n1")
        );
        assert_eq!(delete.body.data, Value::Null);
        assert_eq!(delete.body.hash, None);
    }

    #[test]
    fn path_segments_are_encoded() {
        let change = ChangeRecord::update("my notes", "a?b#c", json!({}), "dev-1");
        let request = RemoteRequest::for_change(&change);
        assert_eq!(request.path, "/api/my%20notes/a%3Fb%23c");
    }

    #[test]
    fn url_joining() {
        assert_eq!(join_url("http://h:1/", "/api/x"), "http://h:1/api/x");
        assert_eq!(join_url("http://h:1/base", "health"), "http://h:1/base/health");
    }

    #[test]
    fn classify_statuses() {
        assert_eq!(RemoteOutcome::classify(201, b""), RemoteOutcome::Accepted);
        assert_eq!(
            RemoteOutcome::classify(409, br#"{"updated_at":"2024-01-01T00:00:00Z"}"#),
            RemoteOutcome::Conflict {
                snapshot: Some(json!({"updated_at": "2024-01-01T00:00:00Z"}))
            }
        );
        assert_eq!(
            RemoteOutcome::classify(409, b"<html>"),
            RemoteOutcome::Conflict { snapshot: None }
        );
        assert_eq!(
            RemoteOutcome::classify(503, b"busy"),
            RemoteOutcome::Rejected {
                status: 503,
                body: "busy".to_string()
            }
        );
    }

    #[test]
    fn retryable_statuses() {
        assert!(is_retryable_status(500));
        assert!(is_retryable_status(429));
        assert!(is_retryable_status(408));
        assert!(!is_retryable_status(400));
        assert!(!is_retryable_status(404));
    }
}
