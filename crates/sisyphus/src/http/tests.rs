//! End-to-end router tests: build a real [`AppState`] against an
//! in-memory store and a mock sandbox backend, then drive requests through
//! [`create_router`] with `tower::ServiceExt::oneshot`, mirroring the
//! `create_test_app` helper pattern the judge platform uses for its own
//! handler tests.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{Request, StatusCode};
use olympus_common::error::AppError;
use serde_json::{json, Value};
use tower::ServiceExt;

use super::create_router;
use super::state::AppState;
use crate::compiler::Compiler;
use crate::config::Config;
use crate::environments::EnvironmentRegistry;
use crate::pool::WorkerPool;
use crate::rate_limit::RateLimiter;
use crate::sandbox::{SandboxBackend, SandboxConfig, SandboxOutput};
use crate::store::InMemoryStore;

/// A backend whose outcome is fixed at construction, standing in for the
/// Docker/Kubernetes sandbox in these tests. `delay` holds a job in the
/// worker long enough to make queue-saturation tests deterministic.
struct MockBackend {
    exit_code: i32,
    stdout: &'static str,
    delay: Duration,
}

#[async_trait]
impl SandboxBackend for MockBackend {
    async fn compile(&self, _cfg: SandboxConfig) -> Result<SandboxOutput, AppError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(SandboxOutput {
            stdout: self.stdout.to_string(),
            stderr: String::new(),
            exit_code: self.exit_code,
            duration: Duration::from_millis(5),
            timed_out: false,
        })
    }

    async fn image_exists(&self, _image: &str) -> Result<bool, AppError> {
        Ok(true)
    }

    async fn close(&self) -> Result<(), AppError> {
        Ok(())
    }
}

fn test_config() -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        worker_count: 2,
        queue_capacity: 1,
        compile_timeout: Duration::from_secs(5),
        rate_limit_capacity: 10,
        rate_limit_window: Duration::from_secs(60),
        redis_url: None,
        cluster_namespace: "default".to_string(),
    }
}

fn build_state(worker_count: usize, queue_capacity: usize, exit_code: i32) -> AppState {
    build_state_with_delay(worker_count, queue_capacity, exit_code, Duration::ZERO)
}

fn build_state_with_delay(
    worker_count: usize,
    queue_capacity: usize,
    exit_code: i32,
    delay: Duration,
) -> AppState {
    let store = Arc::new(InMemoryStore::new());
    let registry = Arc::new(EnvironmentRegistry::hardcoded());
    let backend: Arc<dyn SandboxBackend> = Arc::new(MockBackend {
        exit_code,
        stdout: "hello\n",
        delay,
    });
    let compiler = Arc::new(Compiler::new(backend, registry.clone(), Duration::from_secs(5)));
    let pool = Arc::new(WorkerPool::spawn(worker_count, queue_capacity, compiler, store.clone()));
    let rate_limiter = Arc::new(RateLimiter::new(10, Duration::from_secs(60)));
    let mut config = test_config();
    config.worker_count = worker_count;
    config.queue_capacity = queue_capacity;
    AppState::new(store, pool, registry, rate_limiter, Arc::new(config))
}

fn request_with_peer(method: &str, uri: &str, body: Body) -> Request<Body> {
    let mut req = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(body)
        .unwrap();
    let addr: SocketAddr = "127.0.0.1:9999".parse().unwrap();
    req.extensions_mut().insert(ConnectInfo(addr));
    req
}

fn sample_request_body() -> Value {
    json!({
        "code": "aW50IG1haW4oKXt9",
        "language": "cpp",
    })
}

#[tokio::test]
async fn health_reports_healthy() {
    let state = build_state(2, 10, 0);
    let app = create_router(state);

    let req = request_with_peer("GET", "/health", Body::empty());
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "healthy");
}

#[tokio::test]
async fn environments_lists_all_languages() {
    let state = build_state(2, 10, 0);
    let app = create_router(state);

    let req = request_with_peer("GET", "/api/v1/environments", Body::empty());
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json.as_array().unwrap().len(), 4);
}

#[tokio::test]
async fn submit_then_poll_reaches_a_terminal_result() {
    let state = build_state(2, 10, 0);
    let app = create_router(state);

    let submit = request_with_peer(
        "POST",
        "/api/v1/compile",
        Body::from(sample_request_body().to_string()),
    );
    let resp = app.clone().oneshot(submit).await.unwrap();
    assert_eq!(resp.status(), StatusCode::ACCEPTED);
    let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let json: Value = serde_json::from_slice(&body).unwrap();
    let job_id = json["job_id"].as_str().unwrap().to_string();
    assert_eq!(json["status"], "queued");

    // Poll until the worker has picked the job up and produced a result.
    let mut terminal = None;
    for _ in 0..50 {
        let poll = request_with_peer("GET", &format!("/api/v1/compile/{job_id}"), Body::empty());
        let resp = app.clone().oneshot(poll).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let json: Value = serde_json::from_slice(&body).unwrap();
        if json.get("success").is_some() {
            terminal = Some(json);
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let result = terminal.expect("job never reached a terminal result");
    assert_eq!(result["success"], true);
    assert_eq!(result["compiled"], true);
}

#[tokio::test]
async fn poll_unknown_job_is_not_found() {
    let state = build_state(2, 10, 0);
    let app = create_router(state);

    let poll = request_with_peer(
        "GET",
        &format!("/api/v1/compile/{}", uuid::Uuid::new_v4()),
        Body::empty(),
    );
    let resp = app.oneshot(poll).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn zero_workers_rejects_submission() {
    let state = build_state(0, 10, 0);
    let app = create_router(state);

    let submit = request_with_peer(
        "POST",
        "/api/v1/compile",
        Body::from(sample_request_body().to_string()),
    );
    let resp = app.oneshot(submit).await.unwrap();
    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn validation_rejects_empty_code() {
    let state = build_state(2, 10, 0);
    let app = create_router(state);

    let bad_body = json!({ "code": "", "language": "cpp" });
    let submit = request_with_peer("POST", "/api/v1/compile", Body::from(bad_body.to_string()));
    let resp = app.oneshot(submit).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn queue_saturation_rejects_at_least_one_of_several_concurrent_submits() {
    // One worker held busy by a slow backend, queue capacity one: the first
    // submit is picked up immediately, the second fills the queue, and a
    // third submitted before either drains should be rejected.
    let state = build_state_with_delay(1, 1, 0, Duration::from_millis(200));
    let app = create_router(state);

    let mut statuses = Vec::new();
    for i in 0..3 {
        let submit = request_with_peer(
            "POST",
            "/api/v1/compile",
            Body::from(sample_request_body().to_string()),
        );
        let resp = app.clone().oneshot(submit).await.unwrap();
        statuses.push(resp.status());
        if i == 0 {
            // Give the worker a moment to dequeue the first job before
            // the next submit, so it actually occupies the single slot.
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    assert!(statuses.iter().any(|s| *s == StatusCode::ACCEPTED));
    assert!(
        statuses.iter().any(|s| *s != StatusCode::ACCEPTED),
        "expected at least one rejection under queue saturation, got {statuses:?}"
    );
}
