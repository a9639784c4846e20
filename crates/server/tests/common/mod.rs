//! Common test utilities for API tests with a scripted fetcher.
//!
//! The fixture wires a real [`TicketScout`] and [`PreSaleMonitor`] to a
//! [`MockFetcher`], so requests exercise the full scrape path without
//! network access.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use ticketscout_core::{
    testing::{MockFetcher, NoDelay},
    Config, JsonLdEventParser, MemoryStore, ParserRegistry, PreSaleMonitor, TicketScout,
};
use ticketscout_server::{create_router, AppState};

pub use ticketscout_core::testing::fixtures;

/// In-process server with a controllable fetcher.
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_scrape() {
///     let fixture = TestFixture::new();
///     fixture.fetcher.respond("q=PSG", FetchResponse::ok(page));
///
///     let response = fixture.post("/api/v1/scrape", json!({ "keyword": "PSG" })).await;
///     assert_eq!(response.status, 200);
/// }
/// ```
pub struct TestFixture {
    pub router: Router,
    /// Scripted platform responses
    pub fetcher: Arc<MockFetcher>,
    pub state: Arc<AppState>,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl TestFixture {
    pub fn new() -> Self {
        Self::with_config(fixtures::test_config())
    }

    pub fn with_config(config: Config) -> Self {
        let config = Arc::new(config);
        let fetcher = Arc::new(MockFetcher::new());
        let store = Arc::new(MemoryStore::new());

        let mut parsers = ParserRegistry::new();
        for platform in &config.platforms {
            parsers.register(platform.id.clone(), Arc::new(JsonLdEventParser::new()));
        }
        let scout = TicketScout::builder(config.clone(), fetcher.clone(), store.clone(), parsers)
            .delayer(Arc::new(NoDelay))
            .build();
        let monitor = Arc::new(PreSaleMonitor::new(Arc::new(scout), store));

        let state = Arc::new(AppState::new(config, monitor));
        let router = create_router(state.clone());

        Self {
            router,
            fetcher,
            state,
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

    /// GET a non-JSON endpoint and return the raw body.
    pub async fn get_text(&self, path: &str) -> (StatusCode, String) {
        let request = Request::builder().uri(path).body(Body::empty()).unwrap();
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

    async fn request(&self, method: &str, path: &str, body: Option<Value>) -> TestResponse {
        let mut request_builder = Request::builder().method(method).uri(path);

        let body = if let Some(json_body) = body {
            request_builder = request_builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&json_body).unwrap())
        } else {
            Body::empty()
        };

        let response = self
            .router
            .clone()
            .oneshot(request_builder.body(body).unwrap())
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
