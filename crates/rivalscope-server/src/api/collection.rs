use axum::{
    extract::{rejection::JsonRejection, Path, State},
    Extension, Json,
};
use rivalscope_core::{CollectionJob, CollectionProgress, ComparisonRequest};
use rivalscope_pipeline::Coordinator;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::middleware::RequestId;

use super::{map_pipeline_error, parse_uuid, ApiError, ApiResponse, AppState};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct StartCollectionBody {
    request_id: String,
    brand_id: String,
    competitor_id: String,
    area_id: String,
    #[serde(default)]
    sources: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct StartCollectionData {
    job_id: Uuid,
    status: &'static str,
    /// Seconds.
    estimated_duration: u64,
}

fn coordinator(state: &AppState) -> Result<&Coordinator, ApiError> {
    state
        .coordinator
        .as_ref()
        .ok_or_else(|| ApiError::new("SERVICE_UNAVAILABLE", "collection stage is not running"))
}

pub(super) async fn start_collection(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    body: Result<Json<StartCollectionBody>, JsonRejection>,
) -> Result<Json<ApiResponse<StartCollectionData>>, ApiError> {
    let Json(body) = body.map_err(|e| ApiError::validation(e.body_text()))?;
    let coordinator = coordinator(&state)?;

    let request = ComparisonRequest::new(
        body.request_id,
        body.brand_id,
        body.competitor_id,
        body.area_id,
        body.sources.as_deref(),
    )
    .map_err(|e| ApiError::validation(e.to_string()))?;

    let started = coordinator
        .start_job(request)
        .await
        .map_err(|e| map_pipeline_error(&req_id, &e))?;

    tracing::info!(
        request_id = %req_id.0,
        job_id = %started.job_id,
        "collection accepted"
    );

    Ok(ApiResponse::ok(StartCollectionData {
        job_id: started.job_id,
        status: started.status,
        estimated_duration: started.estimated_duration_secs,
    }))
}

pub(super) async fn get_collection_status(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(job_id): Path<String>,
) -> Result<Json<ApiResponse<CollectionProgress>>, ApiError> {
    let job_id = parse_uuid("jobId", &job_id)?;
    let progress = coordinator(&state)?
        .progress(job_id)
        .await
        .map_err(|e| map_pipeline_error(&req_id, &e))?;
    Ok(ApiResponse::ok(progress))
}

pub(super) async fn get_collection_job(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(job_id): Path<String>,
) -> Result<Json<ApiResponse<CollectionJob>>, ApiError> {
    let job_id = parse_uuid("jobId", &job_id)?;
    let job = coordinator(&state)?
        .status(job_id)
        .await
        .map_err(|e| map_pipeline_error(&req_id, &e))?;
    Ok(ApiResponse::ok(job))
}
