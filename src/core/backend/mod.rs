// src/core/backend/mod.rs

//! The backend seam: a trait for executing one command against the real
//! store, plus the pooled TCP implementation used in production.

mod connection;
mod pool;

pub use connection::BackendConnection;
pub use pool::BackendPool;

use crate::core::errors::RelayError;
use crate::core::protocol::RespFrame;
use async_trait::async_trait;
use bytes::Bytes;

/// Executes a single command against the real store. Implementations must be
/// safe to call from any number of dispatch workers concurrently.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn execute(&self, command: &str, args: &[Bytes]) -> Result<RespFrame, RelayError>;
}
