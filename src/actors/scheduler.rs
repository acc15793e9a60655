//! ProbeScheduler - Keeps one probe worker per enabled target
//!
//! The scheduler holds the agent's current [`TargetSet`] and a map of running
//! workers keyed by target id. Reconciliation diffs the two: workers for ids
//! that left the set are stopped, new ids get a worker, and ids whose address
//! or interval changed are restarted. It runs on a fixed tick and whenever a
//! new set is installed.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::{Mutex, Notify, RwLock, watch};
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, instrument};

use super::prober::ProbeWorkerHandle;
use crate::buffer::ResultBuffer;
use crate::probe::Prober;
use crate::targets::{Target, TargetError, TargetSet};

/// Default reconciliation tick
pub const DEFAULT_RECONCILE_INTERVAL: Duration = Duration::from_secs(5);

pub struct ProbeScheduler {
    targets: RwLock<TargetSet>,
    workers: Mutex<HashMap<u64, ProbeWorkerHandle>>,
    prober: Arc<dyn Prober>,
    buffer: ResultBuffer,
    reconcile_interval: Duration,
    nudge: Notify,
    stop_tx: watch::Sender<bool>,
    stopped: AtomicBool,
}

impl ProbeScheduler {
    pub fn new(
        prober: Arc<dyn Prober>,
        buffer: ResultBuffer,
        reconcile_interval: Duration,
    ) -> Self {
        let (stop_tx, _) = watch::channel(false);

        Self {
            targets: RwLock::new(TargetSet::default()),
            workers: Mutex::new(HashMap::new()),
            prober,
            buffer,
            reconcile_interval,
            nudge: Notify::new(),
            stop_tx,
            stopped: AtomicBool::new(false),
        }
    }

    /// Install a new target set
    ///
    /// An invalid set is rejected and the current one stays in place.
    /// Workers are adjusted by the next reconciliation, which this call
    /// triggers right away.
    pub async fn update_config(&self, set: TargetSet) -> Result<(), TargetError> {
        set.validate()?;

        {
            let mut current = self.targets.write().await;
            info!(
                "target set updated: version '{}' -> '{}' ({} targets)",
                current.version,
                set.version,
                set.targets.len()
            );
            *current = set;
        }

        self.nudge.notify_one();
        Ok(())
    }

    /// Version of the installed target set
    pub async fn current_version(&self) -> String {
        self.targets.read().await.version.clone()
    }

    pub async fn current_set(&self) -> TargetSet {
        self.targets.read().await.clone()
    }

    /// Ids with a live worker, ascending
    pub async fn running_targets(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.workers.lock().await.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Bring the running workers in line with the target set
    ///
    /// Calling this repeatedly without a set change does nothing.
    #[instrument(skip(self))]
    pub async fn reconcile(&self) {
        if self.is_stopped() {
            return;
        }

        let desired: HashMap<u64, Target> = self
            .targets
            .read()
            .await
            .targets
            .iter()
            .map(|t| (t.id, t.clone()))
            .collect();

        let mut workers = self.workers.lock().await;

        let stale: Vec<u64> = workers
            .iter()
            .filter(|(id, worker)| match desired.get(id) {
                None => true,
                Some(target) => worker.is_finished() || needs_restart(worker.target(), target),
            })
            .map(|(id, _)| *id)
            .collect();

        for id in stale {
            if let Some(worker) = workers.remove(&id) {
                debug!("stopping worker for target {}", id);
                worker.shutdown().await;
            }
        }

        for (id, target) in desired {
            workers.entry(id).or_insert_with(|| {
                debug!("starting worker for target {} ({})", id, target.address);
                ProbeWorkerHandle::spawn(
                    target,
                    Arc::clone(&self.prober),
                    self.buffer.clone(),
                    self.stop_tx.subscribe(),
                )
            });
        }
    }

    /// Reconcile on every tick and nudge until the stop signal fires
    pub async fn run(self: Arc<Self>) {
        let mut stop_rx = self.stop_signal();
        let mut ticker = interval(self.reconcile_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            "probe scheduler started (reconcile every {:?})",
            self.reconcile_interval
        );

        while !*stop_rx.borrow() {
            tokio::select! {
                biased;

                changed = stop_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }

                _ = self.nudge.notified() => self.reconcile().await,

                _ = ticker.tick() => self.reconcile().await,
            }
        }

        let workers: Vec<ProbeWorkerHandle> =
            self.workers.lock().await.drain().map(|(_, w)| w).collect();
        join_all(workers.into_iter().map(ProbeWorkerHandle::shutdown)).await;

        info!("probe scheduler stopped");
    }

    /// Fire the global stop signal
    ///
    /// Safe to call any number of times; only the first call has an effect.
    pub fn shutdown(&self) {
        if !self.stopped.swap(true, Ordering::SeqCst) {
            info!("stopping probe scheduler");
            self.stop_tx.send_replace(true);
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Receiver observing the global stop signal
    pub fn stop_signal(&self) -> watch::Receiver<bool> {
        self.stop_tx.subscribe()
    }

    pub fn buffer(&self) -> &ResultBuffer {
        &self.buffer
    }
}

fn needs_restart(running: &Target, desired: &Target) -> bool {
    running.address != desired.address || running.interval_seconds != desired.interval_seconds
}
