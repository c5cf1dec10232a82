//! Common test utilities for API testing with mocks.
//!
//! This module provides a test fixture that creates an in-process router
//! backed by a real orchestrator with mock engine and remote host injected,
//! so the API can be exercised without qBittorrent or an SSH server.

use std::path::Path;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use mediaflow_core::{
    testing::{MockDownloadEngine, MockRemoteExecutor},
    Config, PipelineOrchestrator,
};
use mediaflow_server::state::AppState;

/// Re-export fixtures for test convenience
#[allow(unused_imports)]
pub use mediaflow_core::testing::fixtures;

/// Test fixture for API testing with mock dependencies.
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    /// Mock download engine - control the job list
    pub engine: MockDownloadEngine,
    /// Mock conversion host - control command output
    #[allow(dead_code)]
    pub remote: MockRemoteExecutor,
    /// The orchestrator behind the router
    pub orchestrator: Arc<PipelineOrchestrator>,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl TestFixture {
    /// Create a new test fixture with fast poll intervals.
    pub fn new() -> Self {
        Self::build(Config::default())
    }

    /// Test fixture that accepts `torrent_path` submissions from `dir`.
    #[allow(dead_code)]
    pub fn with_torrent_dir(dir: &Path) -> Self {
        let mut config = Config::default();
        config.server.torrent_dir = Some(dir.to_path_buf());
        Self::build(config)
    }

    fn build(mut config: Config) -> Self {
        config.engine.password = "secret".to_string();
        config.remote.password = Some("hunter2".to_string());
        config.pipeline.acquisition_poll_interval_ms = 20;
        config.pipeline.telemetry_poll_interval_ms = 20;

        let engine = MockDownloadEngine::new();
        let remote = MockRemoteExecutor::new();
        let orchestrator = Arc::new(PipelineOrchestrator::new(
            &config,
            Arc::new(engine.clone()),
            Arc::new(remote.clone()),
        ));

        let state = Arc::new(AppState::new(config, Arc::clone(&orchestrator)));
        let router = mediaflow_server::api::create_router(state);

        Self {
            router,
            engine,
            remote,
            orchestrator,
        }
    }

    /// Send a GET request to the test server.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None).await
    }

    /// Send a POST request with JSON body.
    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body)).await
    }

    /// Send a DELETE request.
    pub async fn delete(&self, path: &str) -> TestResponse {
        self.request("DELETE", path, None).await
    }

    /// Send a GET request and return the raw body as text.
    #[allow(dead_code)]
    pub async fn get_text(&self, path: &str) -> (StatusCode, String) {
        let request = Request::builder()
            .method("GET")
            .uri(path)
            .body(Body::empty())
            .unwrap();

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();
        (status, String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Send a request to the test server.
    async fn request(&self, method: &str, path: &str, body: Option<Value>) -> TestResponse {
        let mut request_builder = Request::builder().method(method).uri(path);

        let body = if let Some(json_body) = body {
            request_builder = request_builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&json_body).unwrap())
        } else {
            Body::empty()
        };

        let request = request_builder.body(body).unwrap();

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };

        TestResponse { status, body }
    }
}

/// Helper to assert a response has expected status.
#[macro_export]
macro_rules! assert_status {
    ($response:expr, $status:expr) => {
        assert_eq!(
            $response.status, $status,
            "Expected status {:?}, got {:?}. Body: {}",
            $status,
            $response.status,
            serde_json::to_string_pretty(&$response.body).unwrap_or_default()
        );
    };
}
