//! Agent report ingestion

use axum::{
    Json,
    extract::State,
    http::HeaderMap,
};
use tracing::{debug, instrument, warn};

use crate::api::{
    error::{ApiError, ApiResult},
    state::ApiState,
};
use crate::protocol::{AGENT_VERSION_HEADER, Action, NODE_ID_HEADER, Report, ReportResponse};

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// POST /api/report
///
/// Stores the ping results of one agent report and answers with the
/// directives the agent has to apply. A `config` action carries the current
/// target set when the agent's version differs from the hub's.
#[instrument(skip_all)]
pub async fn submit_report(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(report): Json<Report>,
) -> ApiResult<Json<ReportResponse>> {
    let node_id = header_value(&headers, NODE_ID_HEADER)
        .ok_or_else(|| ApiError::InvalidRequest(format!("missing {} header", NODE_ID_HEADER)))?;
    let agent_version = header_value(&headers, AGENT_VERSION_HEADER);

    let ping = report
        .ping()
        .transpose()
        .map_err(|e| ApiError::InvalidRequest(format!("malformed ping report: {}", e)))?;

    let host = match report.host() {
        Some(Ok(host)) => Some(host),
        Some(Err(e)) => {
            warn!(node_id = %node_id, "ignoring malformed host report: {}", e);
            None
        }
        None => None,
    };

    for kind in report.kinds() {
        debug!(node_id = %node_id, "report section '{}'", kind);
    }

    let mut actions = Vec::new();
    let mut reported_version = None;

    if let Some(ping) = ping {
        state.storage.insert_results(&node_id, ping.data).await?;

        let current = state.targets.current_set().await?;
        if ping.version != current.version {
            debug!(
                node_id = %node_id,
                "agent at version '{}', hub at '{}'",
                ping.version, current.version
            );
            let set_json = serde_json::to_string(&current)
                .map_err(|e| ApiError::Internal(format!("failed to encode target set: {}", e)))?;
            actions.push(Action::config(set_json));
        }
        reported_version = Some(ping.version);
    }

    if let Some(version) = agent_version.as_deref()
        && version != state.expected_agent_version
    {
        actions.push(Action::upgrade(&state.expected_agent_version));
    }

    state
        .nodes
        .record(&node_id, agent_version, reported_version, host)
        .await;

    Ok(Json(ReportResponse::from_actions(actions)))
}
