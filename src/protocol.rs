//! Wire types shared by the agent and the hub
//!
//! An agent report is a JSON object keyed by telemetry kind. The `"ping"` kind
//! carries buffered probe results together with the agent's current target set
//! version; the hub answers with directives (`actions`) when something on the
//! agent side needs to change.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::host::HostSnapshot;

/// Header carrying the reporting agent's identity
pub const NODE_ID_HEADER: &str = "X-Node-Id";

/// Header carrying the reporting agent's build version
pub const AGENT_VERSION_HEADER: &str = "X-Agent-Version";

/// Report key for latency probe data
pub const PING_KIND: &str = "ping";

/// Report key for the host snapshot
pub const HOST_KIND: &str = "host";

/// Action name: adopt the attached configuration
pub const CONFIG_ACTION: &str = "config";

/// Action name: the agent build is out of date
pub const UPGRADE_ACTION: &str = "upgrade";

/// One probe attempt against one target
///
/// `latency` is `None` when the probe failed. On the wire a failure may arrive
/// as a missing field, `null`, or a negative number; all three decode to `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeResult {
    pub target_id: u64,
    #[serde(
        default,
        deserialize_with = "deserialize_latency",
        skip_serializing_if = "Option::is_none"
    )]
    pub latency: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

impl ProbeResult {
    pub fn success(target_id: u64, latency_ms: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            target_id,
            latency: Some(latency_ms),
            timestamp,
        }
    }

    pub fn failure(target_id: u64, timestamp: DateTime<Utc>) -> Self {
        Self {
            target_id,
            latency: None,
            timestamp,
        }
    }

    pub fn is_failure(&self) -> bool {
        self.latency.is_none()
    }
}

fn deserialize_latency<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<f64>::deserialize(deserializer)?;
    Ok(value.filter(|v| v.is_finite() && *v >= 0.0))
}

/// The `"ping"` section of a report
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PingReport {
    #[serde(default)]
    pub data: Vec<ProbeResult>,
    #[serde(default)]
    pub version: String,
}

/// A full agent report, keyed by telemetry kind
///
/// Kinds the hub does not understand are kept as raw JSON and ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Report(pub HashMap<String, serde_json::Value>);

impl Report {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ping(mut self, ping: &PingReport) -> Result<Self, serde_json::Error> {
        self.0
            .insert(PING_KIND.to_string(), serde_json::to_value(ping)?);
        Ok(self)
    }

    pub fn with_host(mut self, host: &HostSnapshot) -> Result<Self, serde_json::Error> {
        self.0
            .insert(HOST_KIND.to_string(), serde_json::to_value(host)?);
        Ok(self)
    }

    /// Decode the ping section, if present
    pub fn ping(&self) -> Option<Result<PingReport, serde_json::Error>> {
        self.0
            .get(PING_KIND)
            .map(|value| serde_json::from_value(value.clone()))
    }

    /// Decode the host section, if present
    pub fn host(&self) -> Option<Result<HostSnapshot, serde_json::Error>> {
        self.0
            .get(HOST_KIND)
            .map(|value| serde_json::from_value(value.clone()))
    }

    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

/// A directive piggybacked on a report response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub name: String,
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub data: String,
}

impl Action {
    /// Directive carrying the full target set for the ping topic
    pub fn config(set_json: String) -> Self {
        Self {
            name: CONFIG_ACTION.to_string(),
            topic: PING_KIND.to_string(),
            data: set_json,
        }
    }

    /// Directive announcing the build version the hub expects
    pub fn upgrade(expected_version: &str) -> Self {
        Self {
            name: UPGRADE_ACTION.to_string(),
            topic: String::new(),
            data: expected_version.to_string(),
        }
    }
}

/// Hub response to a report
///
/// Serialises as `{"actions": [...]}` when there is something to do and as
/// `{"message": "..."}` otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReportResponse {
    Actions { actions: Vec<Action> },
    Message { message: String },
}

impl ReportResponse {
    pub fn from_actions(actions: Vec<Action>) -> Self {
        if actions.is_empty() {
            ReportResponse::Message {
                message: "report received".to_string(),
            }
        } else {
            ReportResponse::Actions { actions }
        }
    }

    pub fn actions(&self) -> &[Action] {
        match self {
            ReportResponse::Actions { actions } => actions,
            ReportResponse::Message { .. } => &[],
        }
    }
}
