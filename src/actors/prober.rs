//! ProbeWorkerActor - Probes a single target on its own interval
//!
//! ## Message Flow
//!
//! ```text
//! Timer tick → Prober::probe → ProbeResult → ResultBuffer
//!     ↑
//!     └─── Commands (ProbeNow, Shutdown) and the global stop signal
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, instrument, trace, warn};

use super::messages::WorkerCommand;
use crate::buffer::ResultBuffer;
use crate::probe::Prober;
use crate::protocol::ProbeResult;
use crate::targets::Target;

/// Actor that probes one target
///
/// Failures are recorded as failed results; the worker keeps running until
/// it is told to stop.
pub struct ProbeWorkerActor {
    target: Target,
    prober: Arc<dyn Prober>,
    buffer: ResultBuffer,
    command_rx: mpsc::Receiver<WorkerCommand>,
    stop_rx: watch::Receiver<bool>,
}

impl ProbeWorkerActor {
    pub fn new(
        target: Target,
        prober: Arc<dyn Prober>,
        buffer: ResultBuffer,
        command_rx: mpsc::Receiver<WorkerCommand>,
        stop_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            target,
            prober,
            buffer,
            command_rx,
            stop_rx,
        }
    }

    /// Run the actor's main loop
    ///
    /// Stops on a `Shutdown` command, when the command channel closes, or
    /// when the global stop signal fires.
    #[instrument(skip(self), fields(target_id = self.target.id, address = %self.target.address))]
    pub async fn run(self) {
        let Self {
            target,
            prober,
            buffer,
            mut command_rx,
            mut stop_rx,
        } = self;

        debug!("starting probe worker");

        let mut ticker = interval(Duration::from_secs(target.interval_seconds));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        while !*stop_rx.borrow() {
            tokio::select! {
                biased;

                changed = stop_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }

                cmd = command_rx.recv() => {
                    match cmd {
                        Some(WorkerCommand::ProbeNow { respond_to }) => {
                            let result = probe_once(&target, prober.as_ref(), &buffer).await;
                            let _ = respond_to.send(result);
                        }
                        Some(WorkerCommand::Shutdown) => {
                            debug!("received shutdown command");
                            break;
                        }
                        None => {
                            warn!("command channel closed, shutting down");
                            break;
                        }
                    }
                }

                _ = ticker.tick() => {
                    tokio::select! {
                        biased;
                        _ = stop_rx.changed() => break,
                        _ = probe_once(&target, prober.as_ref(), &buffer) => {}
                    }
                }
            }
        }

        debug!("probe worker stopped");
    }
}

async fn probe_once(target: &Target, prober: &dyn Prober, buffer: &ResultBuffer) -> ProbeResult {
    let timestamp = Utc::now();

    let result = match prober.probe(target).await {
        Ok(latency) => {
            trace!(latency, "probe succeeded");
            ProbeResult::success(target.id, latency, timestamp)
        }
        Err(e) => {
            warn!("probe of {} ({}) failed: {}", target.name, target.address, e);
            ProbeResult::failure(target.id, timestamp)
        }
    };

    buffer.push(result.clone()).await;
    result
}

/// Handle for controlling a ProbeWorkerActor
pub struct ProbeWorkerHandle {
    sender: mpsc::Sender<WorkerCommand>,
    target: Target,
    task: JoinHandle<()>,
}

impl ProbeWorkerHandle {
    /// Spawn a worker for `target`
    pub fn spawn(
        target: Target,
        prober: Arc<dyn Prober>,
        buffer: ResultBuffer,
        stop_rx: watch::Receiver<bool>,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(8);

        let actor = ProbeWorkerActor::new(target.clone(), prober, buffer, cmd_rx, stop_rx);
        let task = tokio::spawn(actor.run());

        Self {
            sender: cmd_tx,
            target,
            task,
        }
    }

    /// Probe immediately and return the result
    pub async fn probe_now(&self) -> Result<ProbeResult> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(WorkerCommand::ProbeNow { respond_to: tx })
            .await?;
        Ok(rx.await?)
    }

    /// Stop the worker and wait for its task to end
    pub async fn shutdown(self) {
        let _ = self.sender.send(WorkerCommand::Shutdown).await;
        let _ = self.task.await;
    }

    /// The target definition the worker was started with
    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
