// src/core/backend/pool.rs

//! A fixed-size pool of lazily-established backend connections, selected
//! round-robin. A connection that hits an I/O error is discarded and
//! re-established on next use.

use super::{Backend, BackendConnection};
use crate::config::BackendConfig;
use crate::core::errors::RelayError;
use crate::core::protocol::RespFrame;
use async_trait::async_trait;
use bytes::Bytes;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

pub struct BackendPool {
    addr: String,
    slots: Vec<Mutex<Option<BackendConnection>>>,
    /// Round-robin cursor; starts at a random slot so relay restarts do not
    /// all converge on the same backend connection first.
    next: AtomicUsize,
    connect_timeout: Duration,
    request_timeout: Duration,
}

impl BackendPool {
    pub fn new(config: &BackendConfig) -> Self {
        let size = config.max_connections.max(1);
        let start = SmallRng::from_entropy().gen_range(0..size);
        Self {
            addr: config.addr.clone(),
            slots: (0..size).map(|_| Mutex::new(None)).collect(),
            next: AtomicUsize::new(start),
            connect_timeout: config.connect_timeout,
            request_timeout: config.request_timeout,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }
}

#[async_trait]
impl Backend for BackendPool {
    async fn execute(&self, command: &str, args: &[Bytes]) -> Result<RespFrame, RelayError> {
        let frame = build_request(command, args);

        let idx = self.next.fetch_add(1, Ordering::Relaxed) % self.slots.len();
        let mut slot = self.slots[idx].lock().await;

        let mut conn = match slot.take() {
            Some(conn) => conn,
            None => {
                debug!("establishing backend connection {idx} to {}", self.addr);
                BackendConnection::connect(&self.addr, self.connect_timeout, self.request_timeout)
                    .await?
            }
        };

        match conn.exchange(frame).await {
            Ok(reply) => {
                *slot = Some(conn);
                Ok(reply)
            }
            // The broken connection is dropped; the slot reconnects lazily.
            Err(e) => Err(e),
        }
    }
}

/// Assembles the outgoing command frame: an array of bulk strings with the
/// command name first.
fn build_request(command: &str, args: &[Bytes]) -> RespFrame {
    let mut items = Vec::with_capacity(args.len() + 1);
    items.push(RespFrame::BulkString(Bytes::copy_from_slice(
        command.as_bytes(),
    )));
    items.extend(args.iter().cloned().map(RespFrame::BulkString));
    RespFrame::Array(items)
}
