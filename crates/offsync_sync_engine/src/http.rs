//! HTTP transport implementation.
//!
//! Talks to the remote REST API with `reqwest`. Request bodies are the
//! JSON [`ChangeEnvelope`](offsync_sync_protocol::ChangeEnvelope); responses
//! are returned raw and classified by the engine.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::transport::{RemoteEndpoint, RemoteResponse};
use async_trait::async_trait;
use offsync_sync_protocol::{join_url, RemoteMethod, RemoteRequest, HEALTH_PATH};
use reqwest::{Client, Method, StatusCode};
use std::time::Duration;
use tracing::debug;

/// HTTP-based remote endpoint.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    /// Base URL of the remote (e.g., "https://api.example.com").
    base_url: String,
    client: Client,
    probe_timeout: Duration,
    request_timeout: Duration,
}

impl HttpTransport {
    /// Creates a new HTTP transport.
    pub fn new(
        base_url: impl Into<String>,
        probe_timeout: Duration,
        request_timeout: Duration,
    ) -> SyncResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|err| SyncError::transport_fatal(format!("failed to build HTTP client: {err}")))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
            probe_timeout,
            request_timeout,
        })
    }

    /// Creates a transport from the engine configuration.
    pub fn from_config(config: &SyncConfig) -> SyncResult<Self> {
        Self::new(
            config.remote_url.trim(),
            config.probe_timeout,
            config.request_timeout,
        )
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn build_request(&self, request: &RemoteRequest) -> SyncResult<reqwest::Request> {
        self.client
            .request(method_for(request.method), request.url(&self.base_url))
            .timeout(self.request_timeout)
            .json(&request.body)
            .build()
            .map_err(|err| SyncError::transport_fatal(format!("invalid request: {err}")))
    }

    fn build_probe(&self) -> SyncResult<reqwest::Request> {
        self.client
            .get(join_url(&self.base_url, HEALTH_PATH))
            .timeout(self.probe_timeout)
            .build()
            .map_err(|err| SyncError::transport_fatal(format!("invalid probe request: {err}")))
    }
}

#[async_trait]
impl RemoteEndpoint for HttpTransport {
    async fn probe(&self) -> bool {
        let request = match self.build_probe() {
            Ok(request) => request,
            Err(err) => {
                debug!(error = %err, "connectivity probe not sent");
                return false;
            }
        };

        match self.client.execute(request).await {
            Ok(response) => response.status() == StatusCode::OK,
            Err(err) => {
                debug!(error = %err, "connectivity probe failed");
                false
            }
        }
    }

    async fn send(&self, request: &RemoteRequest) -> SyncResult<RemoteResponse> {
        let http_request = self.build_request(request)?;
        let response = self
            .client
            .execute(http_request)
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(map_reqwest_error)?;
        Ok(RemoteResponse::new(status, body.to_vec()))
    }
}

fn method_for(method: RemoteMethod) -> Method {
    match method {
        RemoteMethod::Post => Method::POST,
        RemoteMethod::Put => Method::PUT,
        RemoteMethod::Delete => Method::DELETE,
    }
}

fn map_reqwest_error(err: reqwest::Error) -> SyncError {
    if err.is_timeout() {
        SyncError::Timeout
    } else if err.is_builder() {
        SyncError::transport_fatal(err.to_string())
    } else {
        SyncError::transport_retryable(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use offsync_sync_protocol::ChangeRecord;
    use serde_json::{json, Value};

    fn transport(base_url: &str) -> HttpTransport {
        HttpTransport::new(base_url, Duration::from_secs(1), Duration::from_secs(2)).unwrap()
    }

    #[test]
    fn update_request_shape_is_correct() {
        let transport = transport("https://api.example.com/");
        let change = ChangeRecord::update("note", "n1", json!({"text": "hi"}), "dev-1");
        let request = transport
            .build_request(&RemoteRequest::for_change(&change))
            .unwrap();

        assert_eq!(request.method(), Method::PUT);
        assert_eq!(request.url().as_str(), "https://api.example.com/api/note/n1");
        assert_eq!(request.timeout(), Some(&Duration::from_secs(2)));

        let body: Value =
            serde_json::from_slice(request.body().unwrap().as_bytes().unwrap()).unwrap();
        assert_eq!(body["data"], json!({"text": "hi"}));
        assert_eq!(body["actor_id"], "dev-1");
        assert_eq!(body["hash"], json!(change.content_hash));
        assert!(body["timestamp"].is_string());
    }

    #[test]
    fn create_and_delete_methods() {
        let transport = transport("https://api.example.com");
        let create = ChangeRecord::create("note", "n1", json!({}), "dev-1");
        let delete = ChangeRecord::delete("note", "n1", "dev-1");

        let create = transport
            .build_request(&RemoteRequest::for_change(&create))
            .unwrap();
        let delete = transport
            .build_request(&RemoteRequest::for_change(&delete))
            .unwrap();

        assert_eq!(create.method(), Method::POST);
        assert_eq!(create.url().path(), "/api/note");
        assert_eq!(delete.method(), Method::DELETE);
        assert_eq!(delete.url().path(), "/api/note/n1");
    }

    #[test]
    fn probe_targets_health() {
        let probe = transport("http://localhost:8080").build_probe().unwrap();
        assert_eq!(probe.method(), Method::GET);
        assert_eq!(probe.url().as_str(), "http://localhost:8080/health");
        assert_eq!(probe.timeout(), Some(&Duration::from_secs(1)));
    }

    #[tokio::test]
    async fn unreachable_remote_is_offline_and_retryable() {
        let transport = transport("http://127.0.0.1:9");
        assert!(!transport.probe().await);

        let change = ChangeRecord::create("note", "n1", json!({}), "dev-1");
        let err = transport
            .send(&RemoteRequest::for_change(&change))
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }
}
