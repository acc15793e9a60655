//! In-memory storage backend (no persistence)
//!
//! Used when no database path is configured and throughout the tests. All
//! data is lost on restart.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use super::backend::{BackendStats, HealthStatus, SampleQuery, StorageBackend};
use super::error::StorageResult;
use super::schema::SampleRow;
use crate::targets::{NewTarget, Target};

#[derive(Debug, Default)]
struct Tables {
    targets: Vec<Target>,

    /// Samples paired with their insert sequence
    samples: Vec<(i64, SampleRow)>,
    last_sequence: i64,
}

/// In-memory storage backend
///
/// Both tables sit behind a single lock so that `replace_window` is atomic
/// with respect to concurrent queries.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    tables: RwLock<Tables>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn list_targets(&self) -> StorageResult<Vec<Target>> {
        Ok(self.tables.read().await.targets.clone())
    }

    async fn insert_target(&self, new: &NewTarget) -> StorageResult<Target> {
        let mut tables = self.tables.write().await;
        let id = tables.targets.iter().map(|t| t.id).max().unwrap_or(0) + 1;

        let target = Target {
            id,
            name: new.name.clone(),
            address: new.address.clone(),
            enabled: true,
            interval_seconds: new.interval_seconds(),
        };
        tables.targets.push(target.clone());
        Ok(target)
    }

    async fn disable_target(&self, id: u64) -> StorageResult<bool> {
        let mut tables = self.tables.write().await;
        match tables.targets.iter_mut().find(|t| t.id == id) {
            Some(target) => {
                target.enabled = false;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn insert_samples(&self, rows: Vec<SampleRow>) -> StorageResult<()> {
        debug!("in-memory backend: storing {} samples", rows.len());
        let mut tables = self.tables.write().await;
        for row in rows {
            tables.last_sequence += 1;
            let sequence = tables.last_sequence;
            tables.samples.push((sequence, row));
        }
        Ok(())
    }

    async fn query_samples(&self, query: &SampleQuery) -> StorageResult<Vec<SampleRow>> {
        let tables = self.tables.read().await;
        let mut rows: Vec<SampleRow> = tables
            .samples
            .iter()
            .filter(|(sequence, row)| query.matches(*sequence, row))
            .map(|(_, row)| row.clone())
            .collect();
        rows.sort_by_key(|row| row.timestamp);
        Ok(rows)
    }

    async fn latest_sequence(&self) -> StorageResult<i64> {
        Ok(self.tables.read().await.last_sequence)
    }

    async fn replace_window(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        through_sequence: i64,
        rows: Vec<SampleRow>,
    ) -> StorageResult<usize> {
        let mut tables = self.tables.write().await;
        let before = tables.samples.len();
        tables.samples.retain(|(sequence, row)| {
            *sequence > through_sequence || row.timestamp < start || row.timestamp >= end
        });
        let removed = before - tables.samples.len();

        for row in rows {
            tables.last_sequence += 1;
            let sequence = tables.last_sequence;
            tables.samples.push((sequence, row));
        }
        Ok(removed)
    }

    async fn delete_before(&self, before: DateTime<Utc>) -> StorageResult<usize> {
        let mut tables = self.tables.write().await;
        let count = tables.samples.len();
        tables.samples.retain(|(_, row)| row.timestamp >= before);
        Ok(count - tables.samples.len())
    }

    async fn health_check(&self) -> StorageResult<HealthStatus> {
        let mut metadata = HashMap::new();
        metadata.insert("backend".to_string(), "memory".to_string());

        Ok(HealthStatus {
            healthy: true,
            message: "in-memory backend operational".to_string(),
            metadata,
        })
    }

    async fn get_stats(&self) -> StorageResult<BackendStats> {
        let tables = self.tables.read().await;
        Ok(BackendStats {
            sample_rows: tables.samples.len() as u64,
            target_rows: tables.targets.len() as u64,
            oldest_sample: tables.samples.iter().map(|(_, r)| r.timestamp).min(),
            newest_sample: tables.samples.iter().map(|(_, r)| r.timestamp).max(),
        })
    }

    async fn close(&self) -> StorageResult<()> {
        Ok(())
    }
}
