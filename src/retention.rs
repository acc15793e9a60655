//! Tiered downsampling of stored samples
//!
//! A compaction pass walks the retention tiers from finest to coarsest. Each
//! tier owns a disjoint slice of history and collapses it to one row per
//! `(node, target, bucket)` using the max-per-bucket reduction. Samples older
//! than the coarsest tier are then deleted.
//!
//! At most one pass runs at a time. Passes are started opportunistically from
//! the ingestion path once the compaction interval has elapsed, or on demand.
//!
//! Ingestion is never blocked by a pass. Each tier records the backend's
//! latest sequence before reading and the rewrite only deletes samples stored
//! at or before it, so samples arriving mid-pass are left for the next pass.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::{debug, error, info, instrument, warn};

use crate::rollup::{expiry_cutoff, reduce_max_per_bucket, tier_windows};
use crate::storage::{SampleQuery, StorageBackend, StorageResult};

/// Default time between automatic passes
pub const DEFAULT_COMPACTION_INTERVAL_HOURS: i64 = 24;

/// What a finished pass did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompactionReport {
    /// Tiers whose window was rewritten
    pub tiers_compacted: usize,

    /// Rows folded away by the reduction
    pub rows_removed: u64,

    /// Rows deleted for being older than the coarsest tier
    pub rows_expired: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompactionOutcome {
    Completed(CompactionReport),

    /// Another pass held the lock; nothing was done
    AlreadyRunning,
}

/// Counters exposed on the stats endpoint
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompactionStats {
    pub last_compaction: Option<DateTime<Utc>>,
    pub passes: u64,
    pub rows_removed: u64,
    pub running: bool,
}

/// Owns the compaction schedule and the pass lock
pub struct Compactor {
    backend: Arc<dyn StorageBackend>,
    interval: Duration,

    /// Held for the whole pass; acquired with `try_lock` only
    pass_lock: Arc<Mutex<()>>,

    /// Advanced only when a pass succeeds
    last_compaction: RwLock<Option<DateTime<Utc>>>,

    passes: AtomicU64,
    rows_removed: AtomicU64,
}

impl Compactor {
    pub fn new(backend: Arc<dyn StorageBackend>, interval: Duration) -> Self {
        Self {
            backend,
            interval,
            pass_lock: Arc::new(Mutex::new(())),
            last_compaction: RwLock::new(None),
            passes: AtomicU64::new(0),
            rows_removed: AtomicU64::new(0),
        }
    }

    pub fn backend(&self) -> &Arc<dyn StorageBackend> {
        &self.backend
    }

    /// A pass is due when none has ever succeeded or the interval has elapsed
    pub async fn is_due(&self, now: DateTime<Utc>) -> bool {
        match *self.last_compaction.read().await {
            None => true,
            Some(last) => now - last >= self.interval,
        }
    }

    /// Start a background pass if one is due and none is running
    ///
    /// Returns `true` when a pass was spawned. Never waits for the lock.
    pub async fn spawn_if_due(self: &Arc<Self>, now: DateTime<Utc>) -> bool {
        if !self.is_due(now).await {
            return false;
        }

        let Ok(guard) = self.pass_lock.clone().try_lock_owned() else {
            debug!("compaction already running");
            return false;
        };

        let compactor = Arc::clone(self);
        tokio::spawn(async move {
            match compactor.run_locked(guard, now).await {
                Ok(report) => debug!(?report, "background compaction finished"),
                Err(e) => error!("background compaction failed: {}", e),
            }
        });

        true
    }

    /// Run a pass now unless one is already running
    pub async fn compact_at(&self, now: DateTime<Utc>) -> StorageResult<CompactionOutcome> {
        match self.pass_lock.clone().try_lock_owned() {
            Ok(guard) => self
                .run_locked(guard, now)
                .await
                .map(CompactionOutcome::Completed),
            Err(_) => Ok(CompactionOutcome::AlreadyRunning),
        }
    }

    pub async fn stats(&self) -> CompactionStats {
        CompactionStats {
            last_compaction: *self.last_compaction.read().await,
            passes: self.passes.load(Ordering::Relaxed),
            rows_removed: self.rows_removed.load(Ordering::Relaxed),
            running: self.pass_lock.try_lock().is_err(),
        }
    }

    /// The guard is dropped on every exit path, releasing the pass lock
    async fn run_locked(
        &self,
        _guard: OwnedMutexGuard<()>,
        now: DateTime<Utc>,
    ) -> StorageResult<CompactionReport> {
        let report = self.run_pass(now).await?;

        *self.last_compaction.write().await = Some(now);
        self.passes.fetch_add(1, Ordering::Relaxed);
        self.rows_removed
            .fetch_add(report.rows_removed + report.rows_expired, Ordering::Relaxed);

        Ok(report)
    }

    #[instrument(skip(self))]
    async fn run_pass(&self, now: DateTime<Utc>) -> StorageResult<CompactionReport> {
        info!("starting compaction pass");
        let mut report = CompactionReport::default();

        for window in tier_windows(now) {
            let through = self.backend.latest_sequence().await?;
            let query = SampleQuery::range(window.start, window.end).through_sequence(through);

            let rows = self
                .backend
                .query_samples(&query)
                .await
                .inspect_err(|e| {
                    warn!(bucket = window.tier.bucket_secs, "tier read failed: {}", e)
                })?;

            let reduced = reduce_max_per_bucket(&rows, window.tier.bucket());
            if reduced.len() == rows.len() {
                continue;
            }

            let kept = reduced.len() as u64;
            let deleted = self
                .backend
                .replace_window(window.start, window.end, through, reduced)
                .await
                .inspect_err(|e| {
                    warn!(bucket = window.tier.bucket_secs, "tier rewrite failed: {}", e)
                })?;

            debug!(
                bucket = window.tier.bucket_secs,
                deleted, kept, "tier compacted"
            );
            report.tiers_compacted += 1;
            report.rows_removed += (deleted as u64).saturating_sub(kept);
        }

        report.rows_expired = self.backend.delete_before(expiry_cutoff(now)).await? as u64;

        info!(
            tiers = report.tiers_compacted,
            removed = report.rows_removed,
            expired = report.rows_expired,
            "compaction pass complete"
        );

        Ok(report)
    }
}
