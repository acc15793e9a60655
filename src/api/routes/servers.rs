//! Latency series per node

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;

use crate::api::{
    error::{ApiError, ApiResult},
    state::ApiState,
    types::SeriesResponse,
};
use crate::rollup::Period;

#[derive(Debug, Deserialize)]
pub struct SeriesQuery {
    /// day, week, month or year (default: day)
    period: Option<String>,
}

/// GET /api/servers/:id
///
/// Max latency per bucket for every target the node has data for
pub async fn get_server_series(
    State(state): State<ApiState>,
    Path(node_id): Path<String>,
    Query(query): Query<SeriesQuery>,
) -> ApiResult<Json<SeriesResponse>> {
    let period = match query.period.as_deref() {
        None => Period::default(),
        Some(raw) => raw.parse::<Period>().map_err(ApiError::InvalidRequest)?,
    };

    let series = state.storage.query_series(&node_id, period).await?;

    Ok(Json(SeriesResponse {
        node_id,
        period,
        series,
    }))
}
