//! Manual maintenance triggers

use axum::{Json, extract::State};

use crate::api::{
    error::{ApiError, ApiResult},
    state::ApiState,
    types::CompactResponse,
};
use crate::retention::CompactionOutcome;

/// POST /api/maintenance/compact
///
/// Runs a compaction pass and waits for it. Answers 409 while another pass
/// is in progress.
pub async fn compact(State(state): State<ApiState>) -> ApiResult<Json<CompactResponse>> {
    match state.storage.compact_now().await? {
        CompactionOutcome::Completed(report) => Ok(Json(CompactResponse {
            status: "completed".to_string(),
            report,
        })),
        CompactionOutcome::AlreadyRunning => Err(ApiError::Conflict(
            "a compaction pass is already running".to_string(),
        )),
    }
}
