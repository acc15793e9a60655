//! REST API for the hub
//!
//! Agents push reports here and receive their directives in the response;
//! operators manage targets and read latency series.
//!
//! ## Architecture
//!
//! - **Axum** web framework with Tower middleware
//! - **Actor handles** for ingestion, queries and compaction
//! - **Bearer auth** on admin routes when a token is configured
//!
//! ## Endpoints
//!
//! - `POST /api/report` - Agent report ingestion and config sync
//! - `GET /api/probes` - Enabled targets
//! - `POST /api/probes` - Create a target (admin)
//! - `DELETE /api/probes/{id}` - Disable a target (admin)
//! - `GET /api/servers/{id}?period=` - Latency series for a node
//! - `GET /api/nodes` - Last report per node
//! - `GET /api/health` - Health check
//! - `GET /api/stats` - Storage and compaction statistics
//! - `POST /api/maintenance/compact` - Run a compaction pass (admin)

pub mod error;
pub mod middleware;
pub mod routes;
pub mod state;
pub mod types;

pub use error::{ApiError, ApiResult};
pub use state::{ApiState, NodeRegistry, NodeStatus};
pub use types::{
    CompactResponse, HealthResponse, NodesResponse, ProbesResponse, SeriesResponse, StatsResponse,
};

use std::net::{Ipv4Addr, SocketAddr};

use axum::{
    Router,
    routing::{MethodRouter, delete, get, post},
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Bind address (e.g., "0.0.0.0:8080")
    pub bind_addr: SocketAddr,

    /// Token required on admin routes
    pub auth_token: Option<String>,

    /// Enable CORS for dashboard
    pub enable_cors: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 8080)),
            auth_token: None,
            enable_cors: true,
        }
    }
}

/// Require the bearer token on `route` when one is configured
fn admin(route: MethodRouter<ApiState>, token: &Option<String>) -> MethodRouter<ApiState> {
    match token {
        Some(token) => route.route_layer(axum::middleware::from_fn_with_state(
            token.clone(),
            middleware::auth::auth_middleware,
        )),
        None => route,
    }
}

/// Build the router without binding it
pub fn router(config: &ApiConfig, state: ApiState) -> Router {
    let token = &config.auth_token;

    let mut app = Router::new()
        .route("/api/health", get(routes::health::health_check))
        .route("/api/report", post(routes::report::submit_report))
        .route(
            "/api/probes",
            get(routes::probes::list_probes)
                .merge(admin(post(routes::probes::create_probe), token)),
        )
        .route(
            "/api/probes/:id",
            admin(delete(routes::probes::delete_probe), token),
        )
        .route("/api/servers/:id", get(routes::servers::get_server_series))
        .route("/api/nodes", get(routes::nodes::list_nodes))
        .route("/api/nodes/:id", get(routes::nodes::get_node))
        .route("/api/stats", get(routes::stats::get_stats))
        .route(
            "/api/maintenance/compact",
            admin(post(routes::maintenance::compact), token),
        )
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if config.enable_cors {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        app = app.layer(cors);
    }

    app
}

/// Spawn the API server
///
/// This starts an Axum HTTP server in a background task.
/// Returns the server's local address.
pub async fn spawn_api_server(config: ApiConfig, state: ApiState) -> anyhow::Result<SocketAddr> {
    info!("starting API server on {}", config.bind_addr);

    let app = router(&config, state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    let addr = listener.local_addr()?;

    info!("API server listening on {}", addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("API server error: {}", e);
        }
    });

    Ok(addr)
}
