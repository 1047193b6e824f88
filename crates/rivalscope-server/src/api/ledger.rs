use axum::{
    extract::{Path, State},
    Extension, Json,
};
use rivalscope_core::LedgerRecord;

use crate::middleware::RequestId;

use super::{map_store_error, ApiError, ApiResponse, AppState};

pub(super) async fn get_ledger_record(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(request_id): Path<String>,
) -> Result<Json<ApiResponse<LedgerRecord>>, ApiError> {
    let record = state
        .store
        .get(&request_id)
        .await
        .map_err(|e| map_store_error(&req_id, &e))?;
    Ok(ApiResponse::ok(record))
}
