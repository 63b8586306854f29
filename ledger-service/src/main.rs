use std::net::SocketAddr;

use ledger_service::{api, config::Config, state::AppState};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting VoteChain ledger service");

    let config = Config::from_env();
    let port = config.port;
    let (state, _fanout_worker) = AppState::initialize(config).await?;
    info!("Database initialized successfully");

    let app = api::router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
