use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use tracing::trace;

use crate::retention::DEFAULT_COMPACTION_INTERVAL_HOURS;

/// Storage backend configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StorageConfig {
    /// In-memory storage (no persistence)
    #[serde(rename = "none")]
    None,

    /// SQLite database
    Sqlite {
        /// Path to the SQLite database file
        #[serde(default = "default_sqlite_path")]
        path: PathBuf,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Sqlite {
            path: default_sqlite_path(),
        }
    }
}

fn default_sqlite_path() -> PathBuf {
    PathBuf::from("./netwatch.db")
}

/// Hub configuration file
#[derive(Debug, Clone, Deserialize)]
pub struct HubConfig {
    #[serde(default = "default_bind")]
    pub bind: SocketAddr,

    /// Bearer token required on the administrative routes
    pub auth_token: Option<String>,

    #[serde(default = "default_true")]
    pub enable_cors: bool,

    /// Hours between automatic compaction passes
    #[serde(default = "default_compaction_interval")]
    pub compaction_interval_hours: u32,

    /// Agent build the hub expects; others are sent an upgrade directive
    pub agent_version: Option<String>,

    #[serde(default)]
    pub storage: StorageConfig,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            auth_token: None,
            enable_cors: true,
            compaction_interval_hours: default_compaction_interval(),
            agent_version: None,
            storage: StorageConfig::default(),
        }
    }
}

impl HubConfig {
    pub fn compaction_interval(&self) -> chrono::Duration {
        chrono::Duration::hours(i64::from(self.compaction_interval_hours.max(1)))
    }
}

fn default_bind() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_true() -> bool {
    true
}

fn default_compaction_interval() -> u32 {
    DEFAULT_COMPACTION_INTERVAL_HOURS as u32
}

/// Agent configuration file
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Base URL of the hub
    pub collector: Option<String>,

    /// Identity reported in `X-Node-Id` (default: host name)
    pub node_id: Option<String>,

    #[serde(default = "default_report_interval")]
    pub report_interval_secs: u64,

    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,

    /// Reconciliation tick, clamped to 1-5 seconds
    #[serde(default = "default_reconcile_interval")]
    pub reconcile_interval_secs: u64,

    /// Attach a host snapshot to each report
    #[serde(default = "default_true")]
    pub report_host: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            collector: None,
            node_id: None,
            report_interval_secs: default_report_interval(),
            http_timeout_secs: default_http_timeout(),
            reconcile_interval_secs: default_reconcile_interval(),
            report_host: true,
        }
    }
}

impl AgentConfig {
    pub fn report_interval(&self) -> Duration {
        Duration::from_secs(self.report_interval_secs.max(1))
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs.max(1))
    }

    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.reconcile_interval_secs.clamp(1, 5))
    }
}

fn default_report_interval() -> u64 {
    3
}

fn default_http_timeout() -> u64 {
    10
}

fn default_reconcile_interval() -> u64 {
    5
}

pub fn read_hub_config(path: &str) -> anyhow::Result<HubConfig> {
    let file_content = std::fs::read_to_string(path)?;
    serde_json::from_str(&file_content)
        .map_err(|e| anyhow::anyhow!("Invalid hub configuration file provided: {e}"))
        .inspect(|config| trace!("loaded config: {config:?}"))
}

pub fn read_agent_config(path: &str) -> anyhow::Result<AgentConfig> {
    let file_content = std::fs::read_to_string(path)?;
    serde_json::from_str(&file_content)
        .map_err(|e| anyhow::anyhow!("Invalid agent configuration file provided: {e}"))
        .inspect(|config| trace!("loaded config: {config:?}"))
}
