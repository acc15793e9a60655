//! Shared API response types
//!
//! Agents decode [`crate::protocol::ReportResponse`] directly; the types here
//! are for the admin and dashboard endpoints.

use serde::{Deserialize, Serialize};

use crate::actors::messages::StorageStats;
use crate::api::state::NodeStatus;
use crate::retention::CompactionReport;
use crate::rollup::{LatencySeries, Period};
use crate::targets::Target;

/// Response from GET /api/health
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
}

/// Response from GET /api/probes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbesResponse {
    pub version: String,
    pub targets: Vec<Target>,
    pub count: usize,
}

/// Response from GET /api/servers/:id
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesResponse {
    pub node_id: String,
    pub period: Period,
    pub series: Vec<LatencySeries>,
}

/// Response from GET /api/nodes
#[derive(Debug, Clone, Serialize)]
pub struct NodesResponse {
    pub nodes: Vec<NodeStatus>,
    pub count: usize,
}

/// Response from POST /api/maintenance/compact
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompactResponse {
    pub status: String,
    pub report: CompactionReport,
}

/// Response from GET /api/stats
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    pub timestamp: String,
    pub storage: StorageStats,
    pub nodes: usize,
    pub enabled_targets: usize,
    pub target_set_version: String,
}
