// tests/integration/test_helpers.rs

//! Test helpers: a scripted stand-in for the backend pool and a connection
//! coordinator driven over an in-memory duplex stream.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use parking_lot::Mutex;
use resp_relay::config::{Config, RelayMode};
use resp_relay::connection::ConnectionCoordinator;
use resp_relay::core::RelayError;
use resp_relay::core::backend::Backend;
use resp_relay::core::protocol::{RespFrame, RespFrameCodec};
use resp_relay::core::state::ServerState;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::io::DuplexStream;
use tokio::sync::{Semaphore, broadcast};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_util::codec::Framed;

/// A scripted backend: per-key latencies, an optional admission gate, and
/// call recording. Echoes the first argument back as the reply.
#[derive(Default)]
pub struct MockBackend {
    delays: HashMap<Bytes, Duration>,
    default_delay: Option<Duration>,
    /// When present, each call consumes one permit before executing.
    gate: Option<Arc<Semaphore>>,
    fail_commands: Vec<String>,
    pub calls: AtomicUsize,
    concurrent: AtomicUsize,
    pub peak_concurrent: AtomicUsize,
    /// Every (command, args) the backend saw, in arrival order.
    pub seen: Mutex<Vec<(String, Vec<Bytes>)>>,
    /// First arguments in backend completion order.
    pub completed: Mutex<Vec<Bytes>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, key: &str, delay: Duration) -> Self {
        self.delays
            .insert(Bytes::copy_from_slice(key.as_bytes()), delay);
        self
    }

    pub fn with_default_delay(mut self, delay: Duration) -> Self {
        self.default_delay = Some(delay);
        self
    }

    pub fn with_gate(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn with_failure(mut self, command: &str) -> Self {
        self.fail_commands.push(command.to_ascii_uppercase());
        self
    }
}

#[async_trait]
impl Backend for MockBackend {
    async fn execute(&self, command: &str, args: &[Bytes]) -> Result<RespFrame, RelayError> {
        self.seen.lock().push((command.to_string(), args.to_vec()));
        let current = self.concurrent.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_concurrent.fetch_max(current, Ordering::SeqCst);

        if let Some(gate) = &self.gate {
            gate.acquire().await.expect("gate closed").forget();
        }
        let delay = args
            .first()
            .and_then(|first| self.delays.get(first).copied())
            .or(self.default_delay);
        if let Some(delay) = delay {
            sleep(delay).await;
        }

        self.concurrent.fetch_sub(1, Ordering::SeqCst);
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(first) = args.first() {
            self.completed.lock().push(first.clone());
        }

        if self.fail_commands.contains(&command.to_ascii_uppercase()) {
            return Err(RelayError::Backend("scripted failure".to_string()));
        }
        match args.first() {
            Some(first) => Ok(RespFrame::BulkString(first.clone())),
            None => Ok(RespFrame::SimpleString("DONE".to_string())),
        }
    }
}

/// A coordinator wired to an in-memory stream, plus the client end of it.
pub struct TestRelay {
    pub client: Framed<DuplexStream, RespFrameCodec>,
    pub shutdown_tx: broadcast::Sender<()>,
    pub state: Arc<ServerState>,
    pub handle: JoinHandle<()>,
}

/// Spawns a connection coordinator over a duplex stream and returns the
/// client side framed with the RESP codec.
pub async fn spawn_relay(config: Config, backend: Arc<dyn Backend>) -> TestRelay {
    let (client_io, relay_io) = tokio::io::duplex(64 * 1024);
    let state = ServerState::new(config, backend);
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let addr: SocketAddr = "127.0.0.1:49152".parse().expect("test addr");

    let task_state = state.clone();
    let handle = tokio::spawn(async move {
        let mut coordinator =
            ConnectionCoordinator::new(relay_io, addr, task_state, 1, shutdown_rx);
        let _ = coordinator.run().await;
    });

    TestRelay {
        client: Framed::new(client_io, RespFrameCodec),
        shutdown_tx,
        state,
        handle,
    }
}

/// Builds a request frame from string parts.
pub fn cmd(parts: &[&str]) -> RespFrame {
    RespFrame::Array(
        parts
            .iter()
            .map(|p| RespFrame::BulkString(Bytes::copy_from_slice(p.as_bytes())))
            .collect(),
    )
}

/// Reads one frame from the client side, bounded by `wait`.
pub async fn read_frame(
    client: &mut Framed<DuplexStream, RespFrameCodec>,
    wait: Duration,
) -> Option<RespFrame> {
    match timeout(wait, client.next()).await {
        Ok(Some(Ok(frame))) => Some(frame),
        _ => None,
    }
}

/// Default configuration for a synchronous, single-worker relay.
pub fn sync_config() -> Config {
    Config::default()
}

/// Configuration with fast-path mode and concurrent dispatch enabled.
pub fn fast_path_config() -> Config {
    let mut config = Config::default();
    config.relay.mode = RelayMode::FastPath;
    config.relay.concurrent_dispatch = true;
    config
}
