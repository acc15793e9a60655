//! Target administration

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use crate::api::{
    error::{ApiError, ApiResult},
    state::ApiState,
    types::ProbesResponse,
};
use crate::targets::{NewTarget, Target};

/// GET /api/probes
///
/// Lists the enabled targets together with the current set version
pub async fn list_probes(State(state): State<ApiState>) -> ApiResult<Json<ProbesResponse>> {
    let set = state.targets.current_set().await?;

    Ok(Json(ProbesResponse {
        version: set.version,
        count: set.targets.len(),
        targets: set.targets,
    }))
}

/// POST /api/probes
pub async fn create_probe(
    State(state): State<ApiState>,
    Json(new): Json<NewTarget>,
) -> ApiResult<(StatusCode, Json<Target>)> {
    let target = state.targets.create(new).await?;
    Ok((StatusCode::CREATED, Json(target)))
}

/// DELETE /api/probes/:id
///
/// Disables the target. Its history stays queryable.
pub async fn delete_probe(
    State(state): State<ApiState>,
    Path(id): Path<u64>,
) -> ApiResult<StatusCode> {
    if state.targets.disable(id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("target {} not found", id)))
    }
}
