use axum::{
    extract::{Path, State},
    Extension, Json,
};
use rivalscope_core::AnalysisRecord;

use crate::middleware::RequestId;

use super::{map_store_error, parse_uuid, ApiError, ApiResponse, AppState};

pub(super) async fn get_analysis(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(analysis_job_id): Path<String>,
) -> Result<Json<ApiResponse<AnalysisRecord>>, ApiError> {
    let analysis_job_id = parse_uuid("analysisJobId", &analysis_job_id)?;
    let record = state
        .store
        .load_analysis(analysis_job_id)
        .await
        .map_err(|e| map_store_error(&req_id, &e))?;
    Ok(ApiResponse::ok(record))
}
