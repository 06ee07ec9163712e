use axum::{
    body::Body,
    extract::{MatchedPath, Request},
    middleware::{self, Next},
    response::Response,
    routing::get,
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use super::handlers;
use crate::idempotency::{IdempotencyHandler, IdempotencyLayer, IdempotencyMetrics};
use crate::observability::{get_metrics, HealthChecker, LatencyTimer};
use crate::services::ExampleService;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub examples: ExampleService,
    pub health_checker: Arc<HealthChecker>,
    pub idempotency_metrics: Arc<IdempotencyMetrics>,
    pub metrics_handle: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(
        examples: ExampleService,
        health_checker: Arc<HealthChecker>,
        idempotency_metrics: Arc<IdempotencyMetrics>,
    ) -> Self {
        Self {
            examples,
            health_checker,
            idempotency_metrics,
            metrics_handle: None,
        }
    }

    /// Adds metrics handle to the state.
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics_handle = Some(handle);
        self
    }
}

/// Creates the main API router with all routes.
///
/// The idempotency layer sits inside the request-id and tracing layers so
/// replayed responses are traced and tagged like fresh ones.
pub fn create_router(state: AppState, idempotency: Arc<IdempotencyHandler>) -> Router {
    Router::new()
        // Health endpoints
        .route("/health", get(handlers::health_check))
        .route("/ping", get(handlers::ping))
        .route("/ping/", get(handlers::ping))
        // Metrics endpoints
        .route("/metrics", get(handlers::metrics_endpoint))
        .route("/metrics/idempotency", get(handlers::idempotency_stats))
        // Example endpoints
        .route(
            "/examples",
            get(handlers::list_examples).post(handlers::create_example),
        )
        .route(
            "/examples/",
            get(handlers::list_examples).post(handlers::create_example),
        )
        .route(
            "/examples/:id",
            get(handlers::get_example)
                .put(handlers::update_example)
                .delete(handlers::delete_example),
        )
        .route_layer(middleware::from_fn(track_http_metrics))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                        let request_id = request
                            .headers()
                            .get("x-request-id")
                            .and_then(|value| value.to_str().ok())
                            .unwrap_or("-");
                        tracing::info_span!(
                            "http_request",
                            method = %request.method(),
                            uri = %request.uri(),
                            request_id = %request_id,
                        )
                    }),
                )
                .layer(PropagateRequestIdLayer::x_request_id())
                .layer(IdempotencyLayer::new(idempotency)),
        )
}

async fn track_http_metrics(request: Request, next: Next) -> Response {
    let timer = LatencyTimer::new();
    let method = request.method().to_string();
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|matched| matched.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());

    let response = next.run(request).await;

    get_metrics().record_http_request(&method, &path, response.status().as_u16(), timer.elapsed_ms());
    response
}
