//! Transport layer abstraction for sync operations.

use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use offsync_sync_protocol::{RemoteOutcome, RemoteRequest};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// A raw response from the remote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body.
    pub body: Vec<u8>,
}

impl RemoteResponse {
    /// Creates a response.
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Creates a response with an empty body.
    pub fn empty(status: u16) -> Self {
        Self::new(status, Vec::new())
    }

    /// Creates a response with a JSON body.
    pub fn json(status: u16, body: &Value) -> Self {
        Self::new(status, body.to_string())
    }

    /// Classifies the response.
    pub fn outcome(&self) -> RemoteOutcome {
        RemoteOutcome::classify(self.status, &self.body)
    }
}

/// The remote authority the engine syncs with.
///
/// This trait abstracts the network layer, allowing for different
/// implementations (HTTP, in-process mocks for testing, etc.).
/// Timeouts are applied by the engine around every call.
#[async_trait]
pub trait RemoteEndpoint: Send + Sync {
    /// Returns true if the remote answered its health check.
    async fn probe(&self) -> bool;

    /// Sends a change request.
    ///
    /// Any HTTP status is a successful send; errors are reserved for
    /// requests that never got an answer.
    async fn send(&self, request: &RemoteRequest) -> SyncResult<RemoteResponse>;
}

/// A scripted reply for [`MockRemote`].
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Answer with this response.
    Respond(RemoteResponse),
    /// Fail as if the network dropped the request.
    Fail(String),
}

/// An in-process remote for testing.
///
/// Replies are taken from a queue; once it is empty every request gets the
/// default response (201 unless changed). All requests are recorded.
#[derive(Debug)]
pub struct MockRemote {
    online: AtomicBool,
    replies: Mutex<VecDeque<MockReply>>,
    default_response: Mutex<RemoteResponse>,
    requests: Mutex<Vec<RemoteRequest>>,
    latency: Mutex<Duration>,
}

impl MockRemote {
    /// Creates a reachable mock that accepts everything.
    pub fn new() -> Self {
        Self {
            online: AtomicBool::new(true),
            replies: Mutex::new(VecDeque::new()),
            default_response: Mutex::new(RemoteResponse::empty(201)),
            requests: Mutex::new(Vec::new()),
            latency: Mutex::new(Duration::ZERO),
        }
    }

    /// Creates an unreachable mock.
    pub fn offline() -> Self {
        let remote = Self::new();
        remote.set_online(false);
        remote
    }

    /// Sets whether the mock answers probes and requests.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Queues a response for the next request.
    pub fn push_response(&self, response: RemoteResponse) {
        self.replies.lock().push_back(MockReply::Respond(response));
    }

    /// Queues a transport failure for the next request.
    pub fn push_failure(&self, message: impl Into<String>) {
        self.replies.lock().push_back(MockReply::Fail(message.into()));
    }

    /// Sets the response used once the queue is empty.
    pub fn set_default_response(&self, response: RemoteResponse) {
        *self.default_response.lock() = response;
    }

    /// Delays every reply by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = latency;
    }

    /// Returns every request received so far.
    pub fn requests(&self) -> Vec<RemoteRequest> {
        self.requests.lock().clone()
    }

    /// Returns the number of requests received so far.
    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }
}

impl Default for MockRemote {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteEndpoint for MockRemote {
    async fn probe(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    async fn send(&self, request: &RemoteRequest) -> SyncResult<RemoteResponse> {
        if !self.online.load(Ordering::SeqCst) {
            return Err(SyncError::transport_retryable("remote unreachable"));
        }
        self.requests.lock().push(request.clone());

        let latency = *self.latency.lock();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let reply = self.replies.lock().pop_front();
        match reply {
            Some(MockReply::Respond(response)) => Ok(response),
            Some(MockReply::Fail(message)) => Err(SyncError::transport_retryable(message)),
            None => Ok(self.default_response.lock().clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use offsync_sync_protocol::ChangeRecord;
    use serde_json::json;

    fn request() -> RemoteRequest {
        RemoteRequest::for_change(&ChangeRecord::create("note", "n1", json!({}), "dev-1"))
    }

    #[tokio::test]
    async fn mock_remote_connection() {
        let remote = MockRemote::new();
        assert!(remote.probe().await);

        remote.set_online(false);
        assert!(!remote.probe().await);

        let err = remote.send(&request()).await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(remote.request_count(), 0);
    }

    #[tokio::test]
    async fn mock_remote_scripted_replies() {
        let remote = MockRemote::new();
        remote.push_response(RemoteResponse::json(409, &json!({"text": "remote"})));
        remote.push_failure("connection reset");

        let first = remote.send(&request()).await.unwrap();
        assert_eq!(
            first.outcome(),
            RemoteOutcome::Conflict {
                snapshot: Some(json!({"text": "remote"}))
            }
        );

        assert!(remote.send(&request()).await.is_err());

        let third = remote.send(&request()).await.unwrap();
        assert_eq!(third.outcome(), RemoteOutcome::Accepted);
        assert_eq!(remote.request_count(), 3);
        assert_eq!(remote.requests()[0].path, "/api/note");
    }
}
