// src/server/initialization.rs

//! Builds everything the accept loop needs: the backend pool, shared state,
//! and the bound listener.

use super::context::ServerContext;
use crate::config::{Config, RelayMode};
use crate::core::backend::{Backend, BackendPool};
use crate::core::state::ServerState;
use anyhow::Result;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::info;

/// Initializes all relay components before starting the accept loop.
pub async fn setup(config: Config) -> Result<ServerContext> {
    log_startup_info(&config);
    let (shutdown_tx, _) = broadcast::channel(1);

    let pool = BackendPool::new(&config.backend);
    info!(
        "Backend pool ready: {} with up to {} connections.",
        config.backend.addr,
        pool.capacity()
    );
    let backend: Arc<dyn Backend> = Arc::new(pool);

    let state = ServerState::new(config, backend);

    let listener =
        TcpListener::bind((state.config.host.as_str(), state.config.port)).await?;
    info!(
        "resp-relay listening on {}:{}",
        state.config.host, state.config.port
    );

    Ok(ServerContext {
        state,
        listener,
        shutdown_tx,
    })
}

/// Logs key configuration parameters at startup.
fn log_startup_info(config: &Config) {
    match config.relay.mode {
        RelayMode::FastPath => info!(
            "Operating mode: fast-path (synthetic replies for registered commands)."
        ),
        RelayMode::Synchronous => info!("Operating mode: synchronous relay."),
    }
    info!(
        "Concurrent dispatch: {} (up to {} workers per connection).",
        config.relay.concurrent_dispatch,
        config.max_dispatch_workers()
    );
    if config.compression.compress {
        info!(
            "Argument compression enabled for payloads of {} bytes and above.",
            config.compression.min_size
        );
    }
}
