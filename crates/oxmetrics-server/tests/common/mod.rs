#![allow(dead_code)]

use axum::body::{to_bytes, Body};
use axum::http::{HeaderMap, Request, StatusCode};
use oxmetrics_server::app;
use oxmetrics_server::state::AppState;
use oxmetrics_storage::{MemStorage, MetricStorage, SqliteStorage};
use serde_json::Value;
use std::sync::Arc;
use tempfile::TempDir;
use tower::util::ServiceExt;

pub struct TestContext {
    pub temp_dir: TempDir,
    pub storage: Arc<dyn MetricStorage>,
    pub state: AppState,
    pub app: axum::Router,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_str(&self.body).unwrap_or(Value::Null)
    }
}

fn context_with(storage: Arc<dyn MetricStorage>, temp_dir: TempDir, key: &str) -> TestContext {
    let state = AppState::new(Arc::clone(&storage), None, key);
    let app = app::build_http_app(state.clone());
    TestContext {
        temp_dir,
        storage,
        state,
        app,
    }
}

/// In-memory store, no key.
pub fn build_test_context() -> TestContext {
    build_keyed_context("")
}

pub fn build_keyed_context(key: &str) -> TestContext {
    let temp_dir = tempfile::tempdir().expect("tempdir should be created");
    let storage = Arc::new(MemStorage::with_snapshot(temp_dir.path().join("db.json")));
    context_with(storage, temp_dir, key)
}

pub fn build_sqlite_context() -> TestContext {
    let temp_dir = tempfile::tempdir().expect("tempdir should be created");
    let dsn = temp_dir.path().join("metrics.db");
    let storage = Arc::new(
        SqliteStorage::open(&dsn.to_string_lossy(), false).expect("sqlite should open"),
    );
    context_with(storage, temp_dir, "")
}

pub async fn send(app: &axum::Router, req: Request<Body>) -> TestResponse {
    let resp = app
        .clone()
        .oneshot(req)
        .await
        .expect("request should be handled");
    let status = resp.status();
    let headers = resp.headers().clone();
    let bytes = to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("body should read");
    TestResponse {
        status,
        headers,
        body: String::from_utf8_lossy(&bytes).to_string(),
    }
}

pub async fn request_no_body(app: &axum::Router, method: &str, uri: &str) -> TestResponse {
    let req = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .expect("request should build");
    send(app, req).await
}

pub async fn request_json(
    app: &axum::Router,
    uri: &str,
    body: Value,
    headers: &[(&str, &str)],
) -> TestResponse {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("Content-Type", "application/json");
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let req = builder
        .body(Body::from(body.to_string()))
        .expect("request should build");
    send(app, req).await
}

pub async fn request_raw(app: &axum::Router, uri: &str, body: &'static str) -> TestResponse {
    let req = Request::builder()
        .method("POST")
        .uri(uri)
        .header("Content-Type", "application/json")
        .body(Body::from(body))
        .expect("request should build");
    send(app, req).await
}
