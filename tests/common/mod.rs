//! Common test helpers for integration tests.
//!
//! # Note
//!
//! The `#![allow(dead_code)]` attribute is necessary because Rust compiles each
//! integration test file as a separate crate; helpers used by only one test
//! file would otherwise produce warnings in the others.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use task_store_api::api::{AppState, RateLimitConfig, RateLimits, build_router};
use task_store_api::domain::FixedClock;
use task_store_api::infrastructure::{
    AuthenticatedUser, FileTaskRepository, IdentityProvider, Role, StaticTokenIdentityProvider,
    StoreConfig,
};

pub const NOW: &str = "2024-05-01T12:00:00.000Z";
pub const USER_TOKEN: &str = "user-token";
pub const ADMIN_TOKEN: &str = "admin-token";
pub const OTHER_USER_TOKEN: &str = "other-token";

// =============================================================================
// Application Helpers
// =============================================================================

/// A router over a task file in a temporary directory.
pub struct TestApp {
    pub router: Router,
    pub tasks_file: PathBuf,
    _directory: TempDir,
}

impl TestApp {
    /// Creates an application without authentication.
    pub fn new() -> Self {
        Self::build(StoreConfig::new("tasks.json"), None, RateLimitConfig::default())
    }

    /// Creates an application with limits applied to its task file.
    pub fn with_store(configure: impl FnOnce(StoreConfig) -> StoreConfig) -> Self {
        Self::build(configure(StoreConfig::new("tasks.json")), None, RateLimitConfig::default())
    }

    /// Creates an application whose `/tasks` and `/admin` routes require the
    /// tokens [`USER_TOKEN`] (`user-1`, role `user`), [`OTHER_USER_TOKEN`]
    /// (`user-2`, role `user`) or [`ADMIN_TOKEN`] (role `admin`).
    pub fn with_authentication() -> Self {
        let provider = StaticTokenIdentityProvider::new()
            .with_token(USER_TOKEN, AuthenticatedUser::new("user-1", Role::User))
            .with_token(OTHER_USER_TOKEN, AuthenticatedUser::new("user-2", Role::User))
            .with_token(ADMIN_TOKEN, AuthenticatedUser::new("admin-1", Role::Admin));
        Self::build(
            StoreConfig::new("tasks.json"),
            Some(Arc::new(provider)),
            RateLimitConfig::default(),
        )
    }

    /// Creates an application with a custom identity provider.
    pub fn with_identity_provider(provider: Arc<dyn IdentityProvider>) -> Self {
        Self::build(StoreConfig::new("tasks.json"), Some(provider), RateLimitConfig::default())
    }

    /// Creates an application without authentication and with custom
    /// request limits.
    pub fn with_rate_limits(rate_limits: RateLimitConfig) -> Self {
        Self::build(StoreConfig::new("tasks.json"), None, rate_limits)
    }

    fn build(
        config: StoreConfig,
        identity_provider: Option<Arc<dyn IdentityProvider>>,
        rate_limits: RateLimitConfig,
    ) -> Self {
        let directory = tempfile::tempdir().unwrap();
        let tasks_file = directory.path().join("tasks.json");
        std::fs::write(&tasks_file, "[]").unwrap();
        let config = StoreConfig {
            path: tasks_file.clone(),
            ..config
        };

        let state = AppState::new(Arc::new(FileTaskRepository::new(config)))
            .with_clock(Arc::new(FixedClock::new(NOW)))
            .with_identity_provider(identity_provider)
            .with_rate_limits(RateLimits::new(rate_limits));

        Self {
            router: build_router(state),
            tasks_file,
            _directory: directory,
        }
    }

    /// Writes raw content to the task file.
    pub fn write_tasks_file(&self, contents: &str) {
        std::fs::write(&self.tasks_file, contents).unwrap();
    }

    /// Reads the task file as JSON.
    pub fn read_tasks_file(&self) -> Value {
        serde_json::from_str(&std::fs::read_to_string(&self.tasks_file).unwrap()).unwrap()
    }

    /// Sends a request and returns the status and the JSON body
    /// (`Value::Null` for an empty body).
    pub async fn send(&self, method: Method, uri: &str, body: Option<Value>, token: Option<&str>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    /// Sends a bodiless GET and returns the status and the `Retry-After`
    /// header, if any.
    pub async fn get_retry_after(&self, uri: &str) -> (StatusCode, Option<String>) {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let response = self.router.clone().oneshot(request).await.unwrap();
        let retry_after = response
            .headers()
            .get(header::RETRY_AFTER)
            .map(|value| value.to_str().unwrap().to_string());
        (response.status(), retry_after)
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.send(Method::GET, uri, None, None).await
    }

    pub async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.send(Method::POST, uri, Some(body), None).await
    }

    /// Creates a task through the API and returns its JSON representation.
    pub async fn create_task(&self, title: &str) -> Value {
        let (status, task) = self.post("/tasks", serde_json::json!({"title": title})).await;
        assert_eq!(status, StatusCode::CREATED, "unexpected body: {task}");
        task
    }
}
