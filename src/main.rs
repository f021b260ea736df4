use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::EnvFilter;

use aegis::config::{Cli, Config};
use aegis::routes;
use aegis::state::AppState;
use aegis::sync::{spawn_probe, DynRemoteStore, HttpRemoteStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Parse CLI args and load config
    let cli = Cli::parse();
    let data_dir = Config::data_dir(&cli)?;
    std::fs::create_dir_all(&data_dir)?;
    tracing::info!("Data directory: {}", data_dir.display());

    let config = Config::load(&cli)?;

    // Remote sync is optional; without a URL reports simply stay pending
    let remote: Option<DynRemoteStore> = match HttpRemoteStore::from_config(&config.remote)? {
        Some(remote) => {
            tracing::info!("Remote sync enabled: {:?}", config.remote.url);
            Some(Arc::new(remote) as DynRemoteStore)
        }
        None => {
            tracing::warn!("No remote configured, reports will stay on this device");
            None
        }
    };

    let state = AppState::build(config.clone(), remote.clone()).await?;

    // Reconcile on every reconnect, and once now if already online
    state.reconciler.clone().spawn_on_reconnect();

    if let (Some(remote), Some(secs)) = (remote, config.sync.probe_interval_secs) {
        tracing::info!("Probing remote every {}s", secs);
        spawn_probe(
            state.connectivity.clone(),
            remote,
            Duration::from_secs(secs.max(1)),
        );
    }

    // The presentation layer may be served from another origin
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    let app = routes::router(state).layer(cors);

    // Start server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    tracing::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
