//! API shared state containing actor handles

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;

use crate::actors::storage::StorageHandle;
use crate::host::HostSnapshot;
use crate::registry::TargetRegistry;

/// What the hub last heard from a node
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeStatus {
    pub node_id: String,
    pub last_report: DateTime<Utc>,
    pub agent_version: Option<String>,

    /// Target set version the node reported
    pub config_version: Option<String>,
    pub host: Option<HostSnapshot>,
}

/// Latest report metadata per node
#[derive(Debug, Default)]
pub struct NodeRegistry {
    nodes: RwLock<HashMap<String, NodeStatus>>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a report; absent fields keep their previous value
    pub async fn record(
        &self,
        node_id: &str,
        agent_version: Option<String>,
        config_version: Option<String>,
        host: Option<HostSnapshot>,
    ) {
        let mut nodes = self.nodes.write().await;
        let status = nodes
            .entry(node_id.to_string())
            .or_insert_with(|| NodeStatus {
                node_id: node_id.to_string(),
                last_report: Utc::now(),
                agent_version: None,
                config_version: None,
                host: None,
            });

        status.last_report = Utc::now();
        if agent_version.is_some() {
            status.agent_version = agent_version;
        }
        if config_version.is_some() {
            status.config_version = config_version;
        }
        if host.is_some() {
            status.host = host;
        }
    }

    pub async fn get(&self, node_id: &str) -> Option<NodeStatus> {
        self.nodes.read().await.get(node_id).cloned()
    }

    /// All known nodes ordered by id
    pub async fn list(&self) -> Vec<NodeStatus> {
        let mut nodes: Vec<NodeStatus> = self.nodes.read().await.values().cloned().collect();
        nodes.sort_by(|a, b| a.node_id.cmp(&b.node_id));
        nodes
    }
}

/// Shared state passed to all API handlers
#[derive(Clone)]
pub struct ApiState {
    /// Handle to the storage actor for ingestion and queries
    pub storage: StorageHandle,

    pub targets: TargetRegistry,

    pub nodes: Arc<NodeRegistry>,

    /// Agent build the hub expects
    pub expected_agent_version: String,
}

impl ApiState {
    pub fn new(
        storage: StorageHandle,
        targets: TargetRegistry,
        expected_agent_version: String,
    ) -> Self {
        Self {
            storage,
            targets,
            nodes: Arc::new(NodeRegistry::new()),
            expected_agent_version,
        }
    }
}
