// src/connection/coordinator.rs

//! The per-connection coordinator. It owns one accepted connection
//! end-to-end: reads frames under a rolling deadline, assigns sequence
//! numbers in strict arrival order, feeds the bounded work queue, and writes
//! responses back in the exact order the client issued its requests.

use super::guard::ConnectionGuard;
use crate::config::RelayMode;
use crate::core::commands::fast_path;
use crate::core::compress;
use crate::core::errors::RelayError;
use crate::core::protocol::{RespFrame, RespFrameCodec};
use crate::core::relay::{Delivery, Dispatcher, RequestUnit};
use crate::core::state::ServerState;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::timeout;
use tokio_util::codec::Framed;
use tracing::{debug, warn};

/// Capacity of the per-connection work queue. A full queue blocks the read
/// loop and therefore the client.
const REQUEST_BUFFER_SIZE: usize = 8;

/// Owns one client connection's lifecycle.
pub struct ConnectionCoordinator<S> {
    framed: Framed<S, RespFrameCodec>,
    addr: SocketAddr,
    state: Arc<ServerState>,
    session_id: u64,
    shutdown_rx: broadcast::Receiver<()>,
    /// Exclusively owned by the coordinator; assigned at read time only.
    next_sequence: u64,
    dispatcher: Arc<Dispatcher>,
    /// Dropped on close; workers observe the closed queue and exit.
    work_tx: Option<mpsc::Sender<RequestUnit>>,
}

impl<S: AsyncRead + AsyncWrite + Unpin> ConnectionCoordinator<S> {
    /// Sets up the work queue and dispatch machinery and starts the single
    /// resident worker every connection begins with.
    pub fn new(
        socket: S,
        addr: SocketAddr,
        state: Arc<ServerState>,
        session_id: u64,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> Self {
        let (work_tx, work_rx) = mpsc::channel(REQUEST_BUFFER_SIZE);
        let concurrent = state.config.relay.concurrent_dispatch;
        let max_workers = if concurrent {
            state.config.max_dispatch_workers()
        } else {
            1
        };
        let dispatcher = Dispatcher::new(
            state.backend.clone(),
            work_rx,
            concurrent,
            max_workers,
            state.config.compression.min_size,
        );
        dispatcher.start();

        Self {
            framed: Framed::new(socket, RespFrameCodec),
            addr,
            state,
            session_id,
            shutdown_rx,
            next_sequence: 0,
            dispatcher,
            work_tx: Some(work_tx),
        }
    }

    /// Runs the connection to completion and then tears it down.
    pub async fn run(&mut self) -> Result<(), RelayError> {
        let _guard = ConnectionGuard::new(self.state.clone(), self.session_id, self.addr);
        let result = self.read_loop().await;
        self.close();
        result
    }

    /// The main event loop: a rolling read deadline, the shutdown signal,
    /// and frame processing.
    async fn read_loop(&mut self) -> Result<(), RelayError> {
        let idle = self.state.config.read_idle_timeout;
        loop {
            tokio::select! {
                biased;
                _ = self.shutdown_rx.recv() => {
                    debug!("Session {}: received shutdown signal.", self.session_id);
                    return Ok(());
                }
                read = timeout(idle, self.framed.next()) => {
                    let frame = match read {
                        // The deadline is rolling: expiry just re-arms it.
                        Err(_) => continue,
                        Ok(None) => {
                            debug!("Connection from {} closed by peer.", self.addr);
                            return Ok(());
                        }
                        Ok(Some(Err(e))) => {
                            if is_normal_disconnect(&e) {
                                debug!("Connection from {} closed by peer: {}", self.addr, e);
                            } else {
                                warn!("Connection error for {}: {}", self.addr, e);
                            }
                            return Ok(());
                        }
                        Ok(Some(Ok(frame))) => frame,
                    };

                    debug!("Session {}: received frame: {:?}", self.session_id, frame);
                    let response = self.process(frame).await?;
                    let response = if self.state.config.compression.compress
                        || self.state.config.compression.uncompress
                    {
                        compress::decompress_frame(response)
                    } else {
                        response
                    };
                    // `send` flushes; a write failure is fatal for the
                    // connection.
                    self.framed.send(response).await?;
                }
            }
        }
    }

    /// Validates a request frame, sequences it, and routes it through the
    /// fast path or the synchronous dispatch path.
    async fn process(&mut self, frame: RespFrame) -> Result<RespFrame, RelayError> {
        let Some((command, arguments)) = parse_command(frame) else {
            return Ok(bad_command());
        };
        // Connection-scoped state cannot be honored per client; such
        // commands are rejected, never forwarded.
        if command.eq_ignore_ascii_case("SELECT") {
            return Ok(bad_command());
        }

        self.next_sequence += 1;
        self.state.stats.incr_commands();

        let mut unit = RequestUnit {
            sequence: self.next_sequence,
            command,
            arguments,
            compress: self.state.config.compression.compress,
            delivery: Delivery::FireAndForget,
        };

        if self.state.config.relay.mode == RelayMode::FastPath
            && let Some(synthetic) = fast_path::lookup(&unit.command)
        {
            // The client is answered immediately; the real command still
            // executes and its result is dropped.
            self.enqueue(unit).await?;
            self.state.stats.incr_fast_path();
            return Ok(synthetic.clone());
        }

        let (tx, rx) = oneshot::channel();
        unit.delivery = Delivery::Synchronous(tx);
        self.enqueue(unit).await?;
        rx.await
            .map_err(|_| RelayError::Internal("dispatch worker dropped the response".to_string()))
    }

    /// Hands a unit to the dispatch workers. Blocks when the queue is full,
    /// throttling the read loop.
    async fn enqueue(&self, unit: RequestUnit) -> Result<(), RelayError> {
        let Some(work_tx) = self.work_tx.as_ref() else {
            return Err(RelayError::ConnectionClosed);
        };
        self.dispatcher.note_enqueued();
        work_tx
            .send(unit)
            .await
            .map_err(|_| RelayError::Internal("work queue closed".to_string()))
    }

    /// Closes the work queue so dispatch workers drain and exit. Idempotent.
    fn close(&mut self) {
        if self.work_tx.take().is_some() {
            debug!("Session {}: work queue closed.", self.session_id);
        }
    }
}

/// Extracts the command name and argument payloads from a request frame.
/// Returns `None` for anything that is not a non-empty array of textual
/// command plus bulk-string arguments.
fn parse_command(frame: RespFrame) -> Option<(String, Vec<Bytes>)> {
    let RespFrame::Array(items) = frame else {
        return None;
    };
    let mut items = items.into_iter();
    let command = match items.next()? {
        RespFrame::BulkString(payload) => String::from_utf8(payload.to_vec()).ok()?,
        RespFrame::SimpleString(s) => s,
        _ => return None,
    };
    if command.is_empty() {
        return None;
    }
    let mut arguments = Vec::with_capacity(items.len());
    for item in items {
        match item {
            RespFrame::BulkString(payload) => arguments.push(payload),
            _ => return None,
        }
    }
    Some((command, arguments))
}

/// The generic error response for malformed or unsupported requests.
fn bad_command() -> RespFrame {
    RespFrame::Error("ERR bad command".to_string())
}

/// Helper to check for non-critical disconnection errors.
fn is_normal_disconnect(e: &RelayError) -> bool {
    matches!(e, RelayError::Io(arc_err) if matches!(
        arc_err.kind(),
        std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::BrokenPipe
            | std::io::ErrorKind::UnexpectedEof
            | std::io::ErrorKind::ConnectionAborted
    ))
}
