//! Storage backend trait definition

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::error::StorageResult;
use super::schema::SampleRow;
use crate::targets::{NewTarget, Target};

/// Parameters for fetching samples within a time range
#[derive(Debug, Clone)]
pub struct SampleQuery {
    /// Start of time range (inclusive)
    pub start: DateTime<Utc>,

    /// End of time range (exclusive)
    pub end: DateTime<Utc>,

    /// Restrict to samples reported by this node
    pub node_id: Option<String>,

    /// Only samples stored at or before this sequence number
    pub through_sequence: Option<i64>,
}

impl SampleQuery {
    pub fn range(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start,
            end,
            node_id: None,
            through_sequence: None,
        }
    }

    pub fn for_node(mut self, node_id: impl Into<String>) -> Self {
        self.node_id = Some(node_id.into());
        self
    }

    /// Ignore samples stored after `sequence`
    pub fn through_sequence(mut self, sequence: i64) -> Self {
        self.through_sequence = Some(sequence);
        self
    }

    pub fn matches(&self, sequence: i64, row: &SampleRow) -> bool {
        row.timestamp >= self.start
            && row.timestamp < self.end
            && self.node_id.as_ref().is_none_or(|node| *node == row.node_id)
            && self.through_sequence.is_none_or(|through| sequence <= through)
    }
}

/// Health status of the storage backend
#[derive(Debug, Clone)]
pub struct HealthStatus {
    /// Is the backend operational?
    pub healthy: bool,

    /// Human-readable status message
    pub message: String,

    /// Additional backend-specific metadata
    pub metadata: HashMap<String, String>,
}

/// Row counts and time span of the stored samples
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendStats {
    pub sample_rows: u64,
    pub target_rows: u64,
    pub oldest_sample: Option<DateTime<Utc>>,
    pub newest_sample: Option<DateTime<Utc>>,
}

/// Trait for persistent storage backends
///
/// Implementations must be `Send + Sync`; the hub shares one backend between
/// the storage actor and the target registry.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// All targets, enabled or not, ordered by id
    async fn list_targets(&self) -> StorageResult<Vec<Target>>;

    /// Persist a new enabled target and return it with its assigned id
    ///
    /// Ids are allocated as one past the highest id ever stored, so ids of
    /// disabled targets are never reused.
    async fn insert_target(&self, new: &NewTarget) -> StorageResult<Target>;

    /// Mark a target disabled
    ///
    /// Returns `false` when no target has this id.
    async fn disable_target(&self, id: u64) -> StorageResult<bool>;

    /// Append a batch of samples
    async fn insert_samples(&self, rows: Vec<SampleRow>) -> StorageResult<()>;

    /// Fetch samples within a time range, oldest first
    async fn query_samples(&self, query: &SampleQuery) -> StorageResult<Vec<SampleRow>>;

    /// Sequence number of the newest stored sample, 0 when there is none
    ///
    /// Every insert is assigned a higher sequence than any sample stored
    /// before it.
    async fn latest_sequence(&self) -> StorageResult<i64>;

    /// Atomically replace the samples in `[start, end)` stored at or before
    /// `through_sequence` with `rows`
    ///
    /// Samples inserted after `through_sequence` was read are left alone.
    /// Either all matching rows are removed and all new rows inserted, or
    /// nothing changes. Returns the number of rows removed.
    async fn replace_window(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        through_sequence: i64,
        rows: Vec<SampleRow>,
    ) -> StorageResult<usize>;

    /// Delete samples strictly older than `before`
    ///
    /// Returns the number of samples deleted.
    async fn delete_before(&self, before: DateTime<Utc>) -> StorageResult<usize>;

    /// Check backend health
    async fn health_check(&self) -> StorageResult<HealthStatus>;

    async fn get_stats(&self) -> StorageResult<BackendStats>;

    /// Close the backend and release resources
    async fn close(&self) -> StorageResult<()>;
}
