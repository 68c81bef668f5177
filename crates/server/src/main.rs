mod config;

use anyhow::Result;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::{ServerConfig, DEFAULT_CONFIG_PATH};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).json().init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());

    info!(config_path = %config_path, "starting lettergate");

    let server_config = ServerConfig::load(&config_path)?;
    info!(path = %server_config.config_path.display(), "configuration loaded");
    let app_config = server_config.config;

    let store = lettergate_store::connect(&app_config.store).await?;
    if let Err(e) = store.ping().await {
        // Limiters fail open and the gate reports 503 until the store is back.
        error!(error = %e, "shared store is not reachable at startup");
    }

    let listen = app_config.server.listen.clone();
    let state = lettergate_api::shared(lettergate_api::AppState::new(app_config, store)?);

    lettergate_api::run_server(state, &listen, shutdown_signal()).await?;

    info!("lettergate stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
