//! Message types for actor communication
//!
//! Commands are sent to a specific actor over its mpsc channel. Requests that
//! need an answer carry a oneshot `respond_to` sender.

use serde::Serialize;
use tokio::sync::oneshot;

use crate::protocol::ProbeResult;
use crate::retention::{CompactionOutcome, CompactionStats};
use crate::rollup::{LatencySeries, Period};
use crate::storage::BackendStats;

/// Commands that can be sent to a ProbeWorkerActor
#[derive(Debug)]
pub enum WorkerCommand {
    /// Probe immediately, outside the interval timer
    ///
    /// The result is buffered like a scheduled one and also sent back.
    ProbeNow {
        respond_to: oneshot::Sender<ProbeResult>,
    },

    /// Stop the worker
    ///
    /// An in-flight probe is abandoned.
    Shutdown,
}

/// Commands that can be sent to the StorageActor
#[derive(Debug)]
pub enum StorageCommand {
    /// Persist a batch of results reported by one node
    InsertResults {
        node_id: String,
        results: Vec<ProbeResult>,
        respond_to: oneshot::Sender<anyhow::Result<()>>,
    },

    /// Reduced latency series of one node for a period ending now
    QuerySeries {
        node_id: String,
        period: Period,
        respond_to: oneshot::Sender<anyhow::Result<Vec<LatencySeries>>>,
    },

    /// Run a compaction pass without waiting for the interval
    CompactNow {
        respond_to: oneshot::Sender<anyhow::Result<CompactionOutcome>>,
    },

    /// Get storage statistics
    GetStats {
        respond_to: oneshot::Sender<anyhow::Result<StorageStats>>,
    },

    /// Gracefully shut down the storage actor
    Shutdown,
}

/// Storage statistics
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageStats {
    pub backend: BackendStats,
    pub compaction: CompactionStats,

    /// Result batches accepted since startup
    pub batches_ingested: u64,
}
