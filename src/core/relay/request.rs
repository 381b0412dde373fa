// src/core/relay/request.rs

//! The per-request value object handed from the coordinator to dispatch
//! workers through the work queue.

use crate::core::protocol::RespFrame;
use bytes::Bytes;
use tokio::sync::oneshot;

/// How a finished response leaves the dispatch path.
#[derive(Debug)]
pub enum Delivery {
    /// A caller is blocked on the coordinator waiting for this response.
    Synchronous(oneshot::Sender<RespFrame>),
    /// Fast-path unit: the client was already answered with a synthetic
    /// response, so the real result is dropped on completion.
    FireAndForget,
}

impl Delivery {
    /// Hands the response to the waiting caller, if any. A receiver that went
    /// away together with its connection is not an error.
    pub fn deliver(self, response: RespFrame) {
        if let Delivery::Synchronous(tx) = self {
            let _ = tx.send(response);
        }
    }
}

/// One parsed client command plus its position in the stream.
#[derive(Debug)]
pub struct RequestUnit {
    /// Strictly increasing per connection, assigned at read time; fixes the
    /// required output order.
    pub sequence: u64,
    /// The command verb from the first element of the client frame.
    pub command: String,
    /// Opaque argument payloads in client order.
    pub arguments: Vec<Bytes>,
    /// Compress oversized payloads before dispatch.
    pub compress: bool,
    pub delivery: Delivery,
}
