/// TradeLink server: config loading, storage init, seeding, HTTP server.
mod api;
pub mod config;
mod log_bridge;
pub mod server;
pub mod state;

use crate::config::ConfigError;
use crate::state::AppState;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tradelink_core::seed::seed_defaults;
use tradelink_core::storage::{open_storage, StorageError};
use tradelink_core::store::LinkStore;

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Failed to open storage: {0}")]
    Storage(#[from] StorageError),
    #[error("Failed to start HTTP server: {0}")]
    Bind(String),
    #[error("Failed to wait for shutdown signal: {0}")]
    Signal(#[from] std::io::Error),
}

/// Run until ctrl-c.
pub async fn run() -> Result<(), StartupError> {
    if let Err(e) = log_bridge::init() {
        eprintln!("failed to initialize logger: {}", e);
    }

    let config_path = config::default_config_path();
    let config = config::load_config(&config_path)?;
    log::info!(
        "[tradelink.startup] Loaded config from {}",
        config_path.display()
    );

    let (event_tx, _) = broadcast::channel(256);
    let storage = open_storage(&config.backend)?;
    let store = Arc::new(LinkStore::new(storage).with_events(event_tx.clone()));
    log::info!(
        "[tradelink.startup] Using {} backend",
        store.backend_name()
    );

    if config.seed_defaults {
        // Unreachable backends are reported per request later; startup goes on.
        if let Err(e) = seed_defaults(&store).await {
            log::warn!("[tradelink.startup] Seeding default data failed: {}", e);
        }
    }

    let state = AppState::new(store, event_tx, config.port, config.bind_address.clone());
    spawn_session_sweeper(state.clone(), Duration::from_secs(config.session_idle_secs));
    let port = server::spawn_server(state)
        .await
        .map_err(|e| StartupError::Bind(e.to_string()))?;
    log::info!(
        "[tradelink.startup] Ready on http://{}:{}",
        config.bind_address,
        port
    );

    tokio::signal::ctrl_c().await?;
    log::info!("[tradelink.shutdown] Received ctrl-c, exiting");
    Ok(())
}

fn spawn_session_sweeper(state: AppState, idle: Duration) {
    let period = (idle / 4).max(Duration::from_secs(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            let removed = state.sweep_idle_sessions(idle).await;
            if removed > 0 {
                log::info!("[tradelink.sessions] Dropped {} idle sessions", removed);
            }
        }
    });
}
