//! StorageActor - Ingests reported results and serves latency queries
//!
//! ## Message Flow
//!
//! ```text
//! POST /api/report → InsertResults → backend.insert_samples → Compactor::spawn_if_due
//! GET /api/servers/{id} → QuerySeries → backend.query_samples → build_series
//! ```
//!
//! Compaction never runs on the actor task. Automatic passes and `CompactNow`
//! both execute on spawned tasks, and inserts take no lock shared with a
//! pass, so ingestion keeps flowing while a tier is being rewritten.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, instrument, warn};

use super::messages::{StorageCommand, StorageStats};
use crate::protocol::ProbeResult;
use crate::retention::{CompactionOutcome, Compactor};
use crate::rollup::{LatencySeries, Period, build_series};
use crate::storage::{SampleQuery, SampleRow, StorageBackend};

pub struct StorageActor {
    compactor: Arc<Compactor>,
    command_rx: mpsc::Receiver<StorageCommand>,
    batches_ingested: u64,
}

impl StorageActor {
    pub fn new(
        backend: Arc<dyn StorageBackend>,
        compaction_interval: Duration,
        command_rx: mpsc::Receiver<StorageCommand>,
    ) -> Self {
        Self {
            compactor: Arc::new(Compactor::new(backend, compaction_interval)),
            command_rx,
            batches_ingested: 0,
        }
    }

    /// Run the actor's main loop
    ///
    /// Exits on `Shutdown` or when every handle has been dropped.
    #[instrument(skip(self))]
    pub async fn run(mut self) {
        debug!("starting storage actor");

        while let Some(cmd) = self.command_rx.recv().await {
            match cmd {
                StorageCommand::InsertResults {
                    node_id,
                    results,
                    respond_to,
                } => {
                    let result = self.insert_results(&node_id, results).await;
                    let _ = respond_to.send(result);
                }

                StorageCommand::QuerySeries {
                    node_id,
                    period,
                    respond_to,
                } => {
                    let result = self.query_series(&node_id, period).await;
                    let _ = respond_to.send(result);
                }

                StorageCommand::CompactNow { respond_to } => {
                    let compactor = Arc::clone(&self.compactor);
                    tokio::spawn(async move {
                        let result = compactor
                            .compact_at(Utc::now())
                            .await
                            .context("compaction pass failed");
                        let _ = respond_to.send(result);
                    });
                }

                StorageCommand::GetStats { respond_to } => {
                    let _ = respond_to.send(self.stats().await);
                }

                StorageCommand::Shutdown => {
                    debug!("received shutdown command");
                    break;
                }
            }
        }

        if let Err(e) = self.compactor.backend().close().await {
            warn!("failed to close storage backend: {}", e);
        }

        info!("storage actor stopped");
    }

    #[instrument(skip(self, results), fields(count = results.len()))]
    async fn insert_results(&mut self, node_id: &str, results: Vec<ProbeResult>) -> Result<()> {
        if results.is_empty() {
            return Ok(());
        }

        let rows: Vec<SampleRow> = results
            .iter()
            .map(|r| SampleRow::from_probe_result(node_id, r))
            .collect();

        self.compactor
            .backend()
            .insert_samples(rows)
            .await
            .context("failed to store probe results")?;

        self.batches_ingested += 1;

        if self.compactor.spawn_if_due(Utc::now()).await {
            info!("compaction pass started in background");
        }

        Ok(())
    }

    #[instrument(skip(self))]
    async fn query_series(&self, node_id: &str, period: Period) -> Result<Vec<LatencySeries>> {
        let now = Utc::now();
        // The range end is exclusive; include samples stamped exactly `now`
        let query = SampleQuery::range(now - period.window(), now + Duration::milliseconds(1))
            .for_node(node_id);

        let backend = self.compactor.backend();
        let rows = backend
            .query_samples(&query)
            .await
            .context("failed to load samples")?;

        let names: HashMap<u64, String> = backend
            .list_targets()
            .await
            .context("failed to load targets")?
            .into_iter()
            .map(|t| (t.id, t.name))
            .collect();

        let mut series = build_series(&rows, period.bucket());
        for s in &mut series {
            s.target_name = names.get(&s.target_id).cloned();
        }

        debug!("query produced {} series from {} rows", series.len(), rows.len());
        Ok(series)
    }

    async fn stats(&self) -> Result<StorageStats> {
        Ok(StorageStats {
            backend: self.compactor.backend().get_stats().await?,
            compaction: self.compactor.stats().await,
            batches_ingested: self.batches_ingested,
        })
    }
}

/// Handle for sending commands to the StorageActor
#[derive(Clone)]
pub struct StorageHandle {
    sender: mpsc::Sender<StorageCommand>,
}

impl StorageHandle {
    /// Spawn the storage actor on top of `backend`
    pub fn spawn(backend: Arc<dyn StorageBackend>, compaction_interval: Duration) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(100);

        let actor = StorageActor::new(backend, compaction_interval, cmd_rx);
        tokio::spawn(actor.run());

        Self { sender: cmd_tx }
    }

    /// Persist the results of one report
    ///
    /// An empty batch is accepted and does nothing.
    pub async fn insert_results(&self, node_id: &str, results: Vec<ProbeResult>) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(StorageCommand::InsertResults {
                node_id: node_id.to_string(),
                results,
                respond_to: tx,
            })
            .await?;
        rx.await?
    }

    pub async fn query_series(&self, node_id: &str, period: Period) -> Result<Vec<LatencySeries>> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(StorageCommand::QuerySeries {
                node_id: node_id.to_string(),
                period,
                respond_to: tx,
            })
            .await?;
        rx.await?
    }

    /// Run a compaction pass and wait for it to finish
    pub async fn compact_now(&self) -> Result<CompactionOutcome> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(StorageCommand::CompactNow { respond_to: tx })
            .await?;
        rx.await?
    }

    pub async fn get_stats(&self) -> Result<StorageStats> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(StorageCommand::GetStats { respond_to: tx })
            .await?;
        rx.await?
    }

    /// Shut down the storage actor
    pub async fn shutdown(&self) {
        let _ = self.sender.send(StorageCommand::Shutdown).await;
    }
}
