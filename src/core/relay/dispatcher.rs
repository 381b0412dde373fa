// src/core/relay/dispatcher.rs

//! The state shared by one connection's dispatch workers, and the worker
//! loop itself. The pool is elastic: every connection starts with a single
//! resident worker, and under backlog any worker may spawn one more, bounded
//! by the configured ceiling. Extra workers retire once the backlog drains;
//! the resident worker lives until the work queue closes.

use super::reorder::ReorderQueue;
use super::request::RequestUnit;
use crate::core::backend::Backend;
use crate::core::compress;
use crate::core::protocol::RespFrame;
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, mpsc};
use tokio::time::timeout;
use tracing::{debug, warn};

/// How long a non-resident worker waits on an empty queue before retiring.
const WORKER_IDLE_TIMEOUT: Duration = Duration::from_secs(1);

/// Everything the dispatch workers of one connection share.
pub struct Dispatcher {
    backend: Arc<dyn Backend>,
    /// Multi-consumer access to the work queue: workers take turns holding
    /// the receiver while they wait for a unit.
    work_rx: AsyncMutex<mpsc::Receiver<RequestUnit>>,
    /// Units enqueued but not yet picked up by a worker.
    queued: AtomicUsize,
    live_workers: AtomicUsize,
    max_workers: usize,
    concurrent: bool,
    reorder: Mutex<ReorderQueue>,
    min_compress_size: usize,
}

impl Dispatcher {
    pub fn new(
        backend: Arc<dyn Backend>,
        work_rx: mpsc::Receiver<RequestUnit>,
        concurrent: bool,
        max_workers: usize,
        min_compress_size: usize,
    ) -> Arc<Self> {
        Arc::new(Self {
            backend,
            work_rx: AsyncMutex::new(work_rx),
            queued: AtomicUsize::new(0),
            live_workers: AtomicUsize::new(0),
            max_workers: max_workers.max(1),
            concurrent,
            reorder: Mutex::new(ReorderQueue::with_capacity(max_workers.max(1))),
            min_compress_size,
        })
    }

    /// Starts the resident worker every connection begins with.
    pub fn start(self: &Arc<Self>) {
        self.live_workers.fetch_add(1, Ordering::AcqRel);
        self.spawn_worker(true);
    }

    /// Accounts for a unit the coordinator is about to enqueue. Kept as an
    /// atomic counter because `mpsc::Receiver` does not expose its depth.
    pub fn note_enqueued(&self) {
        self.queued.fetch_add(1, Ordering::Release);
    }

    pub fn live_workers(&self) -> usize {
        self.live_workers.load(Ordering::Acquire)
    }

    /// The growth policy: if work is still queued and the pool is below its
    /// ceiling, reserve a slot and spawn one more worker. Invoked
    /// opportunistically by any running worker after a dequeue.
    fn maybe_grow(self: &Arc<Self>) {
        let reserved = self
            .live_workers
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.max_workers).then_some(n + 1)
            });
        if reserved.is_ok() {
            self.spawn_worker(false);
        }
    }

    fn spawn_worker(self: &Arc<Self>, resident: bool) {
        let dispatcher = Arc::clone(self);
        tokio::spawn(async move { dispatcher.worker_loop(resident).await });
    }

    /// Drains the work queue until it closes (resident worker) or stays idle
    /// past the retirement window (extra workers). The live-worker slot was
    /// reserved by the spawner; the guard releases it on every exit path.
    async fn worker_loop(self: Arc<Self>, resident: bool) {
        let _slot = WorkerSlot(&self.live_workers);
        debug!("dispatch worker started (resident: {resident})");

        loop {
            let unit = if resident {
                self.work_rx.lock().await.recv().await
            } else {
                let pop = async { self.work_rx.lock().await.recv().await };
                match timeout(WORKER_IDLE_TIMEOUT, pop).await {
                    Ok(unit) => unit,
                    // Backlog has drained; the pool shrinks back to its floor.
                    Err(_) => break,
                }
            };
            let Some(unit) = unit else {
                // Queue closed and fully drained: the connection is gone.
                break;
            };

            self.queued.fetch_sub(1, Ordering::AcqRel);
            if self.concurrent && self.queued.load(Ordering::Acquire) > 0 {
                self.maybe_grow();
            }

            self.execute_unit(unit).await;
        }
        debug!("dispatch worker exiting (resident: {resident})");
    }

    async fn execute_unit(&self, unit: RequestUnit) {
        let RequestUnit {
            sequence,
            command,
            arguments,
            compress: want_compress,
            delivery,
        } = unit;

        let arguments = prepare_arguments(arguments, want_compress, self.min_compress_size);

        if self.concurrent {
            // Track the unit's position before the call so an early
            // completion of a later sequence waits behind this one.
            self.reorder.lock().register(sequence, delivery);
            let response = self.call_backend(&command, &arguments).await;
            let ready = self.reorder.lock().complete(sequence, response);
            for (delivery, response) in ready {
                delivery.deliver(response);
            }
        } else {
            // A single worker processes units in enqueue order; no
            // reordering is needed.
            let response = self.call_backend(&command, &arguments).await;
            delivery.deliver(response);
        }
    }

    /// A failed command is an application-level reply for the client, never a
    /// reason to tear the connection down.
    async fn call_backend(&self, command: &str, arguments: &[Bytes]) -> RespFrame {
        match self.backend.execute(command, arguments).await {
            Ok(frame) => frame,
            Err(e) => RespFrame::Error(format!("ERR {e}")),
        }
    }
}

/// Substitutes compressed encodings for payloads at or above the threshold.
fn prepare_arguments(arguments: Vec<Bytes>, compress: bool, min_size: usize) -> Vec<Bytes> {
    if !compress {
        return arguments;
    }
    arguments
        .into_iter()
        .map(|payload| {
            if payload.len() < min_size {
                return payload;
            }
            match compress::compress_payload(&payload) {
                Ok(compressed) => compressed,
                Err(e) => {
                    warn!("payload compression failed, forwarding raw: {e}");
                    payload
                }
            }
        })
        .collect()
}

/// Releases a reserved live-worker slot, including on abnormal exit.
struct WorkerSlot<'a>(&'a AtomicUsize);

impl Drop for WorkerSlot<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}
