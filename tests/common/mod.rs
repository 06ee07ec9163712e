#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{HeaderMap, Method, Request, StatusCode},
    routing::post,
    Json, Router,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

use idempotent_api::api::{create_router, AppState};
use idempotent_api::config::IdempotencySettings;
use idempotent_api::error::{AppError, Result};
use idempotent_api::idempotency::{
    IdempotencyHandler, IdempotencyLayer, IdempotencyStore, InMemoryCache, KeyValueCache,
};
use idempotent_api::observability::HealthChecker;
use idempotent_api::repositories::InMemoryExampleRepository;
use idempotent_api::services::ExampleService;

pub const KEY_HEADER: &str = "X-Idempotency-Key";

/// Cache whose every command fails, as if the backend were down.
pub struct FailingCache;

#[async_trait]
impl KeyValueCache for FailingCache {
    fn name(&self) -> &'static str {
        "failing"
    }

    async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>> {
        Err(AppError::CacheUnavailable("connection refused".to_string()))
    }

    async fn set(&self, _key: &str, _value: Vec<u8>, _ttl: Duration) -> Result<()> {
        Err(AppError::CacheUnavailable("connection refused".to_string()))
    }

    async fn set_nx(&self, _key: &str, _value: Vec<u8>, _ttl: Duration) -> Result<bool> {
        Err(AppError::CacheUnavailable("connection refused".to_string()))
    }

    async fn compare_and_delete(&self, _key: &str, _expected: &[u8]) -> Result<bool> {
        Err(AppError::CacheUnavailable("connection refused".to_string()))
    }

    async fn ping(&self) -> Result<()> {
        Err(AppError::CacheUnavailable("connection refused".to_string()))
    }
}

pub fn idempotency_handler(
    cache: Arc<dyn KeyValueCache>,
    settings: IdempotencySettings,
) -> Arc<IdempotencyHandler> {
    let store = IdempotencyStore::new(cache, settings.key_prefix.clone());
    Arc::new(IdempotencyHandler::new(store, settings).expect("valid settings"))
}

/// Router whose handlers count how often they actually run.
pub struct CountingApp {
    pub router: Router,
    pub calls: Arc<AtomicUsize>,
    pub handler: Arc<IdempotencyHandler>,
}

impl CountingApp {
    pub fn new(cache: Arc<dyn KeyValueCache>, settings: IdempotencySettings) -> Self {
        let calls = Arc::new(AtomicUsize::new(0));
        let handler = idempotency_handler(cache, settings);
        let router = Router::new()
            .route(
                "/examples/",
                post(record_call).put(record_call).patch(record_call).get(record_call),
            )
            .route("/fail", post(fail))
            .with_state(Arc::clone(&calls))
            .layer(IdempotencyLayer::new(Arc::clone(&handler)));

        Self {
            router,
            calls,
            handler,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

async fn record_call(
    State(calls): State<Arc<AtomicUsize>>,
    body: Bytes,
) -> (StatusCode, [(&'static str, &'static str); 1], Json<Value>) {
    let call = calls.fetch_add(1, Ordering::SeqCst) + 1;
    (
        StatusCode::CREATED,
        [("x-handler", "examples")],
        Json(json!({ "call": call, "echo": String::from_utf8_lossy(&body) })),
    )
}

async fn fail(State(calls): State<Arc<AtomicUsize>>) -> (StatusCode, &'static str) {
    calls.fetch_add(1, Ordering::SeqCst);
    (StatusCode::INTERNAL_SERVER_ERROR, "boom")
}

/// The full application router with in-memory backends.
pub struct TestApp {
    pub router: Router,
    pub repository: Arc<InMemoryExampleRepository>,
    pub handler: Arc<IdempotencyHandler>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_cache(Arc::new(InMemoryCache::new()))
    }

    pub fn with_cache(cache: Arc<dyn KeyValueCache>) -> Self {
        let repository = Arc::new(InMemoryExampleRepository::new());
        let handler = idempotency_handler(Arc::clone(&cache), IdempotencySettings::default());
        let state = AppState::new(
            ExampleService::new(repository.clone()),
            Arc::new(HealthChecker::new(cache)),
            handler.metrics(),
        );

        Self {
            router: create_router(state, Arc::clone(&handler)),
            repository,
            handler,
        }
    }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).expect("json body")
    }

    pub fn is_replay(&self) -> bool {
        self.headers
            .get("x-idempotent-replay")
            .map(|value| value == "true")
            .unwrap_or(false)
    }
}

pub fn request(method: Method, uri: &str, key: Option<&str>, body: &str) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(key) = key {
        builder = builder.header(KEY_HEADER, key);
    }
    builder.body(Body::from(body.to_string())).expect("request")
}

/// Sends a request and reads the whole response body.
pub async fn send(router: &Router, request: Request<Body>) -> TestResponse {
    let response = router.clone().oneshot(request).await.expect("infallible");
    let (parts, body) = response.into_parts();
    let body = body.collect().await.expect("body").to_bytes();

    TestResponse {
        status: parts.status,
        headers: parts.headers,
        body,
    }
}

/// Lets background cache writes land.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}
