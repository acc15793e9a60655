use std::sync::Arc;

use clap::Parser;
use netwatch::{
    VERSION,
    actors::storage::StorageHandle,
    api::{ApiConfig, ApiState, spawn_api_server},
    config::{HubConfig, StorageConfig, read_hub_config},
    registry::TargetRegistry,
    storage::{StorageBackend, memory::MemoryBackend},
    util::get_auth_token,
};
use tracing::{info, level_filters::LevelFilter, trace, warn};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
#[command(version, about = "Collect latency reports from netwatch agents")]
struct Args {
    /// Config file
    #[arg(short)]
    file: Option<String>,
}

fn init() {
    let filter = filter::Targets::new().with_targets(vec![
        ("netwatch", LevelFilter::DEBUG),
        ("netwatch_hub", LevelFilter::TRACE),
        ("tower_http", LevelFilter::DEBUG),
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

async fn open_backend(config: &StorageConfig) -> anyhow::Result<Arc<dyn StorageBackend>> {
    match config {
        StorageConfig::None => {
            warn!("using in-memory storage, data is lost on restart");
            Ok(Arc::new(MemoryBackend::new()))
        }
        #[cfg(feature = "storage-sqlite")]
        StorageConfig::Sqlite { path } => {
            info!("opening SQLite database at {}", path.display());
            let backend = netwatch::storage::sqlite::SqliteBackend::new(path).await?;
            Ok(Arc::new(backend))
        }
        #[cfg(not(feature = "storage-sqlite"))]
        StorageConfig::Sqlite { .. } => Err(anyhow::anyhow!(
            "SQLite storage requested but the storage-sqlite feature is disabled"
        )),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init();
    let args = Args::parse();
    trace!("started with args: {args:?}");

    let config = match &args.file {
        Some(path) => read_hub_config(path)?,
        None => HubConfig::default(),
    };

    let backend = open_backend(&config.storage).await?;
    let storage = StorageHandle::spawn(Arc::clone(&backend), config.compaction_interval());
    let targets = TargetRegistry::new(backend);

    let expected_agent_version = config
        .agent_version
        .clone()
        .unwrap_or_else(|| VERSION.to_string());

    let api_config = ApiConfig {
        bind_addr: config.bind,
        auth_token: config.auth_token.clone().or_else(get_auth_token),
        enable_cors: config.enable_cors,
    };
    if api_config.auth_token.is_none() {
        warn!("no auth token configured, admin routes are open");
    }

    let state = ApiState::new(storage.clone(), targets, expected_agent_version);
    let addr = spawn_api_server(api_config, state).await?;
    info!("netwatch hub {} listening on {}", VERSION, addr);

    tokio::signal::ctrl_c().await?;
    info!("received interrupt, shutting down");
    storage.shutdown().await;

    Ok(())
}
