// src/core/state.rs

//! Shared server state visible to every connection.

use crate::config::Config;
use crate::core::backend::Backend;
use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Per-client bookkeeping, kept for logging and shutdown reporting.
#[derive(Debug)]
pub struct ClientInfo {
    pub addr: SocketAddr,
    pub created: Instant,
}

/// Relay-wide counters. Updated with relaxed atomics; they feed logs, not
/// control flow.
#[derive(Debug, Default)]
pub struct ServerStats {
    total_connections: AtomicU64,
    total_commands: AtomicU64,
    fast_path_hits: AtomicU64,
}

impl ServerStats {
    pub fn incr_connections(&self) {
        self.total_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn incr_commands(&self) {
        self.total_commands.fetch_add(1, Ordering::Relaxed);
    }

    pub fn incr_fast_path(&self) {
        self.fast_path_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn total_connections(&self) -> u64 {
        self.total_connections.load(Ordering::Relaxed)
    }

    pub fn total_commands(&self) -> u64 {
        self.total_commands.load(Ordering::Relaxed)
    }

    pub fn fast_path_hits(&self) -> u64 {
        self.fast_path_hits.load(Ordering::Relaxed)
    }
}

/// State shared by the accept loop and every connection coordinator.
pub struct ServerState {
    pub config: Config,
    pub backend: Arc<dyn Backend>,
    pub clients: DashMap<u64, ClientInfo>,
    pub stats: ServerStats,
}

impl ServerState {
    pub fn new(config: Config, backend: Arc<dyn Backend>) -> Arc<Self> {
        Arc::new(Self {
            config,
            backend,
            clients: DashMap::new(),
            stats: ServerStats::default(),
        })
    }
}
