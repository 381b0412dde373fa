// src/server/connection_loop.rs

//! Contains the main loop for accepting connections and handling graceful
//! shutdown.

use super::context::ServerContext;
use crate::connection::ConnectionCoordinator;
use crate::core::state::ClientInfo;
use std::sync::Arc;
use std::time::Instant;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// The main loop that accepts connections and handles graceful shutdown.
pub async fn run(ctx: ServerContext) {
    let mut session_id_counter: u64 = 0;
    let mut client_tasks = JoinSet::new();
    let permits = Arc::new(Semaphore::new(ctx.state.config.max_clients));

    let mut sigint = signal(SignalKind::interrupt()).expect("Failed to create SIGINT stream");
    let mut sigterm = signal(SignalKind::terminate()).expect("Failed to create SIGTERM stream");

    loop {
        tokio::select! {
            biased;

            _ = sigint.recv() => {
                info!("SIGINT received, initiating graceful shutdown.");
                break;
            }
            _ = sigterm.recv() => {
                info!("SIGTERM received, initiating graceful shutdown.");
                break;
            }

            res = ctx.listener.accept() => {
                match res {
                    Ok((socket, addr)) => {
                        let Ok(permit) = permits.clone().try_acquire_owned() else {
                            warn!("Max clients reached, rejecting connection from {}.", addr);
                            drop(socket);
                            continue;
                        };

                        session_id_counter = session_id_counter.wrapping_add(1);
                        let session_id = session_id_counter;
                        ctx.state.stats.incr_connections();
                        ctx.state.clients.insert(session_id, ClientInfo {
                            addr,
                            created: Instant::now(),
                        });
                        debug!("Accepted new connection from: {}", addr);

                        let state = ctx.state.clone();
                        let shutdown_rx = ctx.shutdown_tx.subscribe();
                        client_tasks.spawn(async move {
                            let _permit = permit;
                            let mut coordinator = ConnectionCoordinator::new(
                                socket, addr, state, session_id, shutdown_rx,
                            );
                            if let Err(e) = coordinator.run().await {
                                warn!("Connection from {} terminated unexpectedly: {}", addr, e);
                            }
                        });
                    }
                    Err(e) => error!("Failed to accept connection: {}", e),
                }
            }

            Some(res) = client_tasks.join_next() => {
                if let Err(e) = res
                    && e.is_panic()
                {
                    error!("A connection task panicked: {e:?}");
                }
            }
        }
    }

    info!("Shutting down. Sending signal to all connections.");
    if ctx.shutdown_tx.send(()).is_err() {
        debug!("No active connections to signal.");
    }

    client_tasks.shutdown().await;
    info!(
        "Relay shutdown complete. Served {} connections, {} commands ({} fast-path).",
        ctx.state.stats.total_connections(),
        ctx.state.stats.total_commands(),
        ctx.state.stats.fast_path_hits()
    );
}
