// src/connection/guard.rs

//! Defines `ConnectionGuard`, an RAII guard for connection resource cleanup.

use crate::core::state::ServerState;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::debug;

/// Removes the connection's entry from the shared client registry when the
/// coordinator's scope is exited, on every path.
pub struct ConnectionGuard {
    state: Arc<ServerState>,
    session_id: u64,
    addr: SocketAddr,
}

impl ConnectionGuard {
    pub(crate) fn new(state: Arc<ServerState>, session_id: u64, addr: SocketAddr) -> Self {
        Self {
            state,
            session_id,
            addr,
        }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        debug!(
            "ConnectionGuard dropping, cleaning up resources for connection {}",
            self.addr
        );
        if self.state.clients.remove(&self.session_id).is_none() {
            debug!(
                "Client {} was not in the registry upon cleanup.",
                self.addr
            );
        }
    }
}
