//! Row types persisted by the storage backends
//!
//! Samples are stored one row per probe result. Timestamps are kept as unix
//! milliseconds in SQLite and converted back to `DateTime<Utc>` on read.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::protocol::ProbeResult;

/// One latency sample as stored by the hub
///
/// A `latency` of `None` records a failed probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleRow {
    /// Agent that measured the sample
    pub node_id: String,

    pub target_id: u64,

    pub timestamp: DateTime<Utc>,

    /// Round-trip time in milliseconds
    pub latency: Option<f64>,
}

impl SampleRow {
    pub fn from_probe_result(node_id: &str, result: &ProbeResult) -> Self {
        Self {
            node_id: node_id.to_string(),
            target_id: result.target_id,
            timestamp: result.timestamp,
            latency: result.latency,
        }
    }
}
