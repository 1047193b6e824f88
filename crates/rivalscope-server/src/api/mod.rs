mod analysis;
mod collection;
mod ledger;

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, HeaderName, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use rivalscope_core::Stages;
use rivalscope_ledger::{LedgerError, Store};
use rivalscope_pipeline::{Coordinator, PipelineError};
use serde::Serialize;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use uuid::Uuid;

use crate::middleware::{enforce_rate_limit, request_id, RateLimitState, RequestId};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    /// `None` when this process does not run the collection stage.
    pub coordinator: Option<Coordinator>,
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub data: T,
    pub timestamp: DateTime<Utc>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data,
            timestamp: Utc::now(),
        })
    }
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub success: bool,
    pub error: ErrorBody,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct HealthData {
    status: &'static str,
    store: &'static str,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: ErrorBody {
                code: code.into(),
                message: message.into(),
                details: None,
            },
            timestamp: Utc::now(),
        }
    }

    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.error.details = Some(details);
        self
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new("VALIDATION_ERROR", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("NOT_FOUND", message)
    }

    pub fn rate_limited(retry_after_secs: u64) -> Self {
        Self::new("RATE_LIMIT_EXCEEDED", "rate limit exceeded")
            .with_details(serde_json::json!({ "retryAfterSecs": retry_after_secs }))
    }

    fn status(&self) -> StatusCode {
        match self.error.code.as_str() {
            "VALIDATION_ERROR" => StatusCode::BAD_REQUEST,
            "NOT_FOUND" => StatusCode::NOT_FOUND,
            "RATE_LIMIT_EXCEEDED" => StatusCode::TOO_MANY_REQUESTS,
            "SERVICE_UNAVAILABLE" => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        (self.status(), Json(self)).into_response()
    }
}

pub(super) fn map_store_error(req_id: &RequestId, error: &LedgerError) -> ApiError {
    match error {
        LedgerError::NotFound(request_id) => {
            ApiError::not_found(format!("no ledger record for request {request_id}"))
        }
        LedgerError::JobNotFound(id) => ApiError::not_found(format!("no collection job {id}")),
        LedgerError::AnalysisNotFound(id) => {
            ApiError::not_found(format!("no analysis job {id}"))
        }
        e if e.is_unavailable() => {
            tracing::error!(request_id = %req_id.0, error = %e, "store unavailable");
            ApiError::new("SERVICE_UNAVAILABLE", "store unavailable")
        }
        e => {
            tracing::error!(request_id = %req_id.0, error = %e, "store operation failed");
            ApiError::new("INTERNAL_ERROR", "store operation failed")
        }
    }
}

pub(super) fn map_pipeline_error(req_id: &RequestId, error: &PipelineError) -> ApiError {
    match error {
        PipelineError::InvalidRequest(_)
        | PipelineError::DuplicateRequest(_)
        | PipelineError::UnsupportedSource(_) => ApiError::validation(error.to_string()),
        PipelineError::JobNotFound(id) => ApiError::not_found(format!("no collection job {id}")),
        PipelineError::Store(e) => map_store_error(req_id, e),
    }
}

pub(super) fn parse_uuid(field: &'static str, raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|e| {
        ApiError::validation(format!("{field} must be a UUID"))
            .with_details(serde_json::json!({ "field": field, "reason": e.to_string() }))
    })
}

fn build_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([
            header::CONTENT_TYPE,
            HeaderName::from_static("x-request-id"),
        ])
}

fn api_router(state: &AppState, stages: Stages, rate_limit: RateLimitState) -> Router<AppState> {
    let mut router =
        Router::new().route("/api/v1/ledger/{request_id}", get(ledger::get_ledger_record));

    if stages.collection && state.coordinator.is_some() {
        router = router
            .route(
                "/api/v1/collection/start",
                post(collection::start_collection),
            )
            .route(
                "/api/v1/collection/{job_id}/status",
                get(collection::get_collection_status),
            )
            .route(
                "/api/v1/collection/{job_id}",
                get(collection::get_collection_job),
            );
    }
    if stages.analysis {
        router = router.route(
            "/api/v1/analysis/{analysis_job_id}",
            get(analysis::get_analysis),
        );
    }

    router.layer(axum::middleware::from_fn_with_state(
        rate_limit,
        enforce_rate_limit,
    ))
}

pub fn build_app(state: AppState, stages: Stages, rate_limit: RateLimitState) -> Router {
    let public_routes = Router::new().route("/api/v1/health", get(health));

    Router::new()
        .merge(public_routes)
        .merge(api_router(&state, stages, rate_limit))
        .fallback(not_found_fallback)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(build_cors())
                .layer(axum::middleware::from_fn(request_id)),
        )
        .with_state(state)
}

async fn not_found_fallback() -> ApiError {
    ApiError::not_found("no such route")
}

async fn health(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> impl IntoResponse {
    match state.store.ping().await {
        Ok(()) => (
            StatusCode::OK,
            ApiResponse::ok(HealthData {
                status: "ok",
                store: "ok",
            }),
        )
            .into_response(),
        Err(e) => {
            tracing::warn!(request_id = %req_id.0, error = %e, "health check: store unavailable");
            ApiError::new("SERVICE_UNAVAILABLE", "store unavailable")
                .with_details(serde_json::json!({ "status": "degraded", "store": "unavailable" }))
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests;
