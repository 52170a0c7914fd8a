//! Common test utilities for router tests with mocks.
//!
//! This module provides a test fixture that creates an in-process router
//! with a mock gateway injected, so the HTTP surface can be exercised
//! without a real provider.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::connect_info::{ConnectInfo, MockConnectInfo};
use axum::http::{HeaderMap, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use playback_core::testing::MockGateway;
use playback_core::{
    load_config_from_str, Config, DistributedLock, LockOptions, MemoryStore, Resolver,
    ResolverConfig,
};

/// Re-export fixtures for test convenience
pub use playback_core::testing::fixtures;

/// Test fixture for router testing with a mock gateway.
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    /// Mock gateway - configure downloads and failures
    pub gateway: Arc<MockGateway>,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
    pub text: String,
}

impl TestFixture {
    /// Create a new test fixture with default mocks.
    pub fn new() -> Self {
        let gateway = Arc::new(MockGateway::new());

        let config = test_config();
        let resolver = Resolver::new(
            Arc::clone(&gateway) as Arc<dyn playback_core::ProviderGateway>,
            DistributedLock::new(),
            Arc::new(MemoryStore::new()),
            "test:",
            LockOptions::default(),
            ResolverConfig {
                poll_attempts: 2,
                poll_interval_ms: 10,
                ..Default::default()
            },
        );

        let state = Arc::new(playback_server::state::AppState::new(
            config,
            Arc::new(resolver),
        ));
        let router = playback_server::api::create_router(state)
            .layer(MockConnectInfo(SocketAddr::from(([127, 0, 0, 1], 40000))));

        Self { router, gateway }
    }

    /// Send a GET request to the test router.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request(Request::builder().method("GET").uri(path))
            .await
    }

    /// Send a GET request with extra headers.
    pub async fn get_with_header(&self, path: &str, name: &str, value: &str) -> TestResponse {
        self.request(
            Request::builder()
                .method("GET")
                .uri(path)
                .header(name, value),
        )
        .await
    }

    /// Send a GET request as if it came straight from `peer`.
    pub async fn get_from(&self, path: &str, peer: SocketAddr) -> TestResponse {
        self.request(
            Request::builder()
                .method("GET")
                .uri(path)
                .extension(ConnectInfo(peer)),
        )
        .await
    }

    async fn request(&self, builder: axum::http::request::Builder) -> TestResponse {
        let request = builder.body(Body::empty()).unwrap();

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let headers = response.headers().clone();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let text = String::from_utf8_lossy(&body_bytes).to_string();
        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };

        TestResponse {
            status,
            headers,
            body,
            text,
        }
    }
}

fn test_config() -> Config {
    load_config_from_str(
        r#"
[gateway]
backend = "qbittorrent"

[gateway.qbittorrent]
url = "http://localhost:8080"
username = "admin"
password = "secret"
"#,
    )
    .expect("Failed to parse test config")
}
