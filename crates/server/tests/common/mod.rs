//! Common test utilities for API testing with mocks.
//!
//! Builds an in-process router with mock workers injected, so job API and
//! pipeline behavior can be tested without external binaries.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use slicer_core::{
    testing::{MockFetcher, MockSegmenter},
    Config, DatabaseConfig, JobLedger, JobOrchestrator, JobService, OrchestratorConfig,
    SqliteLedger, StorageConfig, WorkspaceManager,
};
use slicer_server::{api::create_router, state::AppState};

/// Knobs for fixture construction.
#[derive(Debug, Clone)]
pub struct TestConfig {
    /// Start the orchestrator's dispatch loop.
    pub enable_orchestrator: bool,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            enable_orchestrator: false,
        }
    }
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

/// Test fixture: in-process server with mock workers.
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    /// Job ledger backing the router
    pub ledger: Arc<SqliteLedger>,
    /// Mock acquisition worker
    pub fetcher: Arc<MockFetcher>,
    /// Mock segmentation worker
    pub segmenter: Arc<MockSegmenter>,
    /// Orchestrator under test
    pub orchestrator: Arc<JobOrchestrator<MockFetcher, MockSegmenter>>,
    /// Temporary directory for the database and working roots
    pub temp_dir: TempDir,
}

impl TestFixture {
    /// Create a new test fixture with the orchestrator idle.
    pub async fn new() -> Self {
        Self::with_config(TestConfig::default()).await
    }

    /// Create a test fixture with custom configuration.
    pub async fn with_config(test_config: TestConfig) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test.db");

        let storage = StorageConfig {
            uploads_dir: temp_dir.path().join("uploads"),
            segments_dir: temp_dir.path().join("segments"),
            downloads_dir: temp_dir.path().join("downloads"),
            min_free_bytes: 0,
        };

        let config = Config {
            database: DatabaseConfig {
                path: db_path.clone(),
            },
            storage: storage.clone(),
            orchestrator: OrchestratorConfig {
                enabled: test_config.enable_orchestrator,
                poll_interval_ms: 25,
                max_concurrent_jobs: 3,
                workspace_ttl_secs: None,
            },
            ..Default::default()
        };

        let ledger = Arc::new(SqliteLedger::new(&db_path).expect("Failed to create ledger"));
        let workspaces = Arc::new(WorkspaceManager::new(storage));
        let fetcher = Arc::new(MockFetcher::new());
        let segmenter = Arc::new(MockSegmenter::new());

        let orchestrator = Arc::new(JobOrchestrator::new(
            config.orchestrator.clone(),
            Arc::clone(&ledger) as Arc<dyn JobLedger>,
            workspaces,
            Arc::clone(&fetcher),
            Arc::clone(&segmenter),
        ));

        if test_config.enable_orchestrator {
            orchestrator.start().await;
        }

        let state = Arc::new(AppState::new(
            config,
            Arc::clone(&ledger) as Arc<dyn JobLedger>,
            Arc::clone(&orchestrator) as Arc<dyn JobService>,
        ));

        let router = create_router(state);

        Self {
            router,
            ledger,
            fetcher,
            segmenter,
            orchestrator,
            temp_dir,
        }
    }

    /// Write a file into the uploads root and return its path as a string.
    pub fn stage_upload(&self, name: &str, contents: &[u8]) -> String {
        let dir = self.temp_dir.path().join("uploads");
        std::fs::create_dir_all(&dir).expect("Failed to create uploads dir");
        let path = dir.join(name);
        std::fs::write(&path, contents).expect("Failed to write upload");
        path.to_string_lossy().to_string()
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

    /// Send a DELETE request with JSON body.
    pub async fn delete_with_body(&self, path: &str, body: Value) -> TestResponse {
        self.request("DELETE", path, Some(body)).await
    }

    async fn request(&self, method: &str, path: &str, body: Option<Value>) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(path);
        let request = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                builder.body(Body::from(json.to_string())).unwrap()
            }
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("request failed");

        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("failed to read body")
            .to_bytes();

        // Non-JSON endpoints (e.g. /metrics) come back as a string value.
        let body = serde_json::from_slice(&bytes).unwrap_or_else(|_| {
            Value::String(String::from_utf8_lossy(&bytes).to_string())
        });

        TestResponse { status, body }
    }
}
