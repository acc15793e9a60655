//! Reporter - Ships buffered results to the hub and applies its directives
//!
//! ## Message Flow
//!
//! ```text
//! Timer tick → drain ResultBuffer → POST /api/report → ReportResponse
//!                                                         │
//!                        ProbeScheduler::update_config ←──┘ (config action)
//! ```
//!
//! Results are drained before the request is sent. If the request fails they
//! are gone; the next report carries whatever was probed in the meantime.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, instrument, warn};

use super::scheduler::ProbeScheduler;
use crate::host::HostCollector;
use crate::protocol::{
    AGENT_VERSION_HEADER, Action, CONFIG_ACTION, NODE_ID_HEADER, PING_KIND, PingReport, Report,
    ReportResponse, UPGRADE_ACTION,
};
use crate::targets::TargetSet;

/// Settings for the report loop
#[derive(Debug, Clone)]
pub struct ReporterConfig {
    /// Base URL of the hub, e.g. `http://hub:8080`
    pub collector_url: String,
    pub node_id: String,
    pub agent_version: String,
    pub interval: Duration,
    pub timeout: Duration,

    /// Attach a host snapshot to every report
    pub include_host: bool,
}

pub struct Reporter {
    config: ReporterConfig,
    client: reqwest::Client,
    endpoint: String,
    scheduler: Arc<ProbeScheduler>,
    host: Option<HostCollector>,
}

impl Reporter {
    pub fn new(config: ReporterConfig, scheduler: Arc<ProbeScheduler>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .context("failed to build HTTP client")?;

        let endpoint = format!("{}/api/report", config.collector_url.trim_end_matches('/'));
        let host = config.include_host.then(HostCollector::new);

        Ok(Self {
            config,
            client,
            endpoint,
            scheduler,
            host,
        })
    }

    /// Send one report and apply the directives in the answer
    #[instrument(skip(self), fields(node_id = %self.config.node_id))]
    pub async fn report_once(&mut self) -> Result<ReportResponse> {
        let ping = PingReport {
            data: self.scheduler.buffer().drain().await,
            version: self.scheduler.current_version().await,
        };
        debug!(
            "reporting {} results at version '{}'",
            ping.data.len(),
            ping.version
        );

        let mut report = Report::new()
            .with_ping(&ping)
            .context("failed to encode ping section")?;
        if let Some(host) = self.host.as_mut() {
            report = report
                .with_host(&host.snapshot())
                .context("failed to encode host section")?;
        }

        let response: ReportResponse = self
            .client
            .post(&self.endpoint)
            .header(NODE_ID_HEADER, &self.config.node_id)
            .header(AGENT_VERSION_HEADER, &self.config.agent_version)
            .json(&report)
            .send()
            .await
            .context("report request failed")?
            .error_for_status()
            .context("hub rejected report")?
            .json()
            .await
            .context("failed to decode hub response")?;

        for action in response.actions() {
            self.apply(action).await;
        }

        Ok(response)
    }

    async fn apply(&self, action: &Action) {
        match action.name.as_str() {
            CONFIG_ACTION if action.topic == PING_KIND => {
                let applied = match TargetSet::from_json(&action.data) {
                    Ok(set) => self.scheduler.update_config(set).await,
                    Err(e) => Err(e),
                };
                if let Err(e) = applied {
                    warn!("ignoring target set from hub: {}", e);
                }
            }
            UPGRADE_ACTION => {
                warn!(
                    "hub expects agent version {} (running {})",
                    action.data, self.config.agent_version
                );
            }
            other => debug!("ignoring unsupported action '{}'", other),
        }
    }

    /// Report on a fixed cadence until the stop signal fires
    ///
    /// Failed reports are logged and retried on the next tick.
    pub async fn run(mut self, mut stop_rx: watch::Receiver<bool>) {
        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            "reporting to {} every {:?}",
            self.endpoint, self.config.interval
        );

        while !*stop_rx.borrow() {
            tokio::select! {
                biased;

                changed = stop_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }

                _ = ticker.tick() => {
                    if let Err(e) = self.report_once().await {
                        warn!("report failed: {:#}", e);
                    }
                }
            }
        }

        info!("reporter stopped");
    }
}
