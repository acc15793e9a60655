use std::sync::Arc;

use clap::Parser;
use netwatch::{
    VERSION,
    actors::{
        reporter::{Reporter, ReporterConfig},
        scheduler::ProbeScheduler,
    },
    buffer::ResultBuffer,
    config::{AgentConfig, read_agent_config},
    probe::{NetProber, icmp},
    util::{DEFAULT_COLLECTOR, get_collector_url, get_node_id},
};
use tracing::{info, level_filters::LevelFilter, trace, warn};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
#[command(version, about = "Probe network targets and report to a netwatch hub")]
struct Args {
    /// Config file
    #[arg(short)]
    file: Option<String>,

    /// Hub base URL (overrides config and NETWATCH_COLLECTOR)
    #[arg(long)]
    collector: Option<String>,

    /// Node identity (overrides config and NETWATCH_NODE_ID)
    #[arg(long)]
    node_id: Option<String>,
}

fn init() {
    let filter = filter::Targets::new().with_targets(vec![
        ("netwatch", LevelFilter::DEBUG),
        ("netwatch_agent", LevelFilter::TRACE),
    ]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init();
    let args = Args::parse();
    trace!("started with args: {args:?}");

    let config = match &args.file {
        Some(path) => read_agent_config(path)?,
        None => AgentConfig::default(),
    };

    let collector_url = args
        .collector
        .or_else(get_collector_url)
        .or_else(|| config.collector.clone())
        .unwrap_or_else(|| DEFAULT_COLLECTOR.to_string());

    let node_id = args
        .node_id
        .or_else(|| config.node_id.clone())
        .or_else(get_node_id)
        .ok_or_else(|| anyhow::anyhow!("no node id configured and host name unavailable"))?;

    if !icmp::is_available() {
        warn!("ICMP sockets unavailable, falling back to TCP connect probes");
    }

    let scheduler = Arc::new(ProbeScheduler::new(
        Arc::new(NetProber::new()),
        ResultBuffer::new(),
        config.reconcile_interval(),
    ));

    let reporter = Reporter::new(
        ReporterConfig {
            collector_url,
            node_id: node_id.clone(),
            agent_version: VERSION.to_string(),
            interval: config.report_interval(),
            timeout: config.http_timeout(),
            include_host: config.report_host,
        },
        Arc::clone(&scheduler),
    )?;

    info!("netwatch agent {} starting as node '{}'", VERSION, node_id);

    let scheduler_task = tokio::spawn(Arc::clone(&scheduler).run());
    let reporter_task = tokio::spawn(reporter.run(scheduler.stop_signal()));

    tokio::signal::ctrl_c().await?;
    info!("received interrupt, shutting down");
    scheduler.shutdown();

    let (scheduler_result, reporter_result) = tokio::join!(scheduler_task, reporter_task);
    scheduler_result?;
    reporter_result?;

    Ok(())
}
