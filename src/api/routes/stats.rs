//! System statistics endpoint

use axum::{Json, extract::State};

use crate::api::{error::ApiResult, state::ApiState, types::StatsResponse};

/// GET /api/stats
///
/// Storage, compaction and node counters
pub async fn get_stats(State(state): State<ApiState>) -> ApiResult<Json<StatsResponse>> {
    let storage = state.storage.get_stats().await.unwrap_or_default();
    let set = state.targets.current_set().await?;

    Ok(Json(StatsResponse {
        timestamp: chrono::Utc::now().to_rfc3339(),
        storage,
        nodes: state.nodes.list().await.len(),
        enabled_targets: set.targets.len(),
        target_set_version: set.version,
    }))
}
