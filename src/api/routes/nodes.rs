//! Reporting nodes

use axum::{
    Json,
    extract::{Path, State},
};

use crate::api::{
    error::{ApiError, ApiResult},
    state::{ApiState, NodeStatus},
    types::NodesResponse,
};

/// GET /api/nodes
pub async fn list_nodes(State(state): State<ApiState>) -> Json<NodesResponse> {
    let nodes = state.nodes.list().await;

    Json(NodesResponse {
        count: nodes.len(),
        nodes,
    })
}

/// GET /api/nodes/:id
pub async fn get_node(
    State(state): State<ApiState>,
    Path(node_id): Path<String>,
) -> ApiResult<Json<NodeStatus>> {
    state
        .nodes
        .get(&node_id)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("node '{}' has not reported", node_id)))
}
