use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use uuid::Uuid;
use validator::{Validate, ValidationErrors};

use crate::api::requests::{CreateExampleRequest, ListExamplesQuery, UpdateExampleRequest};
use crate::api::responses::{
    ApiResponse, ErrorResponse, ExampleResponse, StatusResponse, ValidationErrorDetail,
};
use crate::error::AppError;
use crate::idempotency::MetricsSnapshot;
use crate::observability::AggregatedHealth;

use super::routes::AppState;

type ApiError = (StatusCode, Json<ApiResponse<()>>);

fn validation_failed(errors: ValidationErrors) -> ApiError {
    let mut details: Vec<ValidationErrorDetail> = errors
        .field_errors()
        .into_iter()
        .flat_map(|(field, errors)| {
            errors.iter().map(move |e| ValidationErrorDetail {
                field: field.to_string(),
                message: e
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("{} is invalid", field)),
            })
        })
        .collect();
    details.sort_by(|a, b| a.field.cmp(&b.field));

    (
        StatusCode::BAD_REQUEST,
        Json(ApiResponse::<()>::error(
            ErrorResponse::new("VALIDATION_ERROR", "Request validation failed").with_details(details),
        )),
    )
}

fn failure(error: AppError, context: &str) -> ApiError {
    let status = error.status_code();
    let code = error.error_code();
    let message = match error {
        AppError::Validation(msg) | AppError::NotFound(msg) | AppError::Conflict(msg) => msg,
        other => {
            tracing::error!("Failed to {}: {}", context, other);
            "An internal error occurred".to_string()
        }
    };
    (
        status,
        Json(ApiResponse::<()>::error(ErrorResponse::new(code, message))),
    )
}

/// Health check endpoint.
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<AggregatedHealth>) {
    let health = state.health_checker.check_all().await;
    let status = if health.status.is_unhealthy() {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    (status, Json(health))
}

/// Liveness probe.
pub async fn ping() -> Json<StatusResponse> {
    Json(StatusResponse::ok())
}

/// Prometheus exposition.
pub async fn metrics_endpoint(State(state): State<AppState>) -> Response {
    match state.metrics_handle {
        Some(ref handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => (StatusCode::SERVICE_UNAVAILABLE, "Metrics exporter not installed").into_response(),
    }
}

/// Counters kept by the idempotency middleware.
pub async fn idempotency_stats(State(state): State<AppState>) -> Json<MetricsSnapshot> {
    Json(state.idempotency_metrics.snapshot())
}

// ============================================================================
// Example Handlers
// ============================================================================

/// Create a new example.
pub async fn create_example(
    State(state): State<AppState>,
    Json(request): Json<CreateExampleRequest>,
) -> Result<(StatusCode, Json<ExampleResponse>), ApiError> {
    request.validate().map_err(validation_failed)?;

    let example = state
        .examples
        .create_example(request.into())
        .await
        .map_err(|e| failure(e, "create example"))?;

    Ok((StatusCode::CREATED, Json(ExampleResponse::from(example))))
}

/// List examples.
pub async fn list_examples(
    State(state): State<AppState>,
    Query(query): Query<ListExamplesQuery>,
) -> Result<Json<Vec<ExampleResponse>>, ApiError> {
    let examples = state
        .examples
        .list_examples(query.into())
        .await
        .map_err(|e| failure(e, "list examples"))?;

    Ok(Json(examples.into_iter().map(ExampleResponse::from).collect()))
}

/// Get example by ID.
pub async fn get_example(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ExampleResponse>, ApiError> {
    match state.examples.get_example(id).await {
        Ok(example) => Ok(Json(ExampleResponse::from(example))),
        Err(e) => Err(failure(e, "get example")),
    }
}

/// Update an example.
pub async fn update_example(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateExampleRequest>,
) -> Result<Json<ExampleResponse>, ApiError> {
    request.validate().map_err(validation_failed)?;

    match state.examples.update_example(id, request.into()).await {
        Ok(example) => Ok(Json(ExampleResponse::from(example))),
        Err(e) => Err(failure(e, "update example")),
    }
}

/// Delete an example.
pub async fn delete_example(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state
        .examples
        .delete_example(id)
        .await
        .map_err(|e| failure(e, "delete example"))?;

    Ok(StatusCode::NO_CONTENT)
}
