// src/core/errors.rs

//! Defines the primary error type for the relay.

use std::sync::Arc;
use thiserror::Error;

/// The main error enum, representing all possible failures within the relay.
/// Using `thiserror` allows for clean error definitions and automatic `From`
/// trait implementations.
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("IO Error: {0}")]
    Io(Arc<std::io::Error>),

    #[error("Incomplete data in stream")]
    IncompleteData,

    #[error("Syntax error")]
    SyntaxError,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Backend timeout during {0}")]
    BackendTimeout(String),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Internal Server Error: {0}")]
    Internal(String),
}

// Manual implementation of Clone because `std::io::Error` is not cloneable.
// Wrapping it in an Arc allows for cheap, shared cloning.
impl Clone for RelayError {
    fn clone(&self) -> Self {
        match self {
            RelayError::Io(e) => RelayError::Io(Arc::clone(e)),
            RelayError::IncompleteData => RelayError::IncompleteData,
            RelayError::SyntaxError => RelayError::SyntaxError,
            RelayError::InvalidRequest(s) => RelayError::InvalidRequest(s.clone()),
            RelayError::Backend(s) => RelayError::Backend(s.clone()),
            RelayError::BackendTimeout(s) => RelayError::BackendTimeout(s.clone()),
            RelayError::ConnectionClosed => RelayError::ConnectionClosed,
            RelayError::Internal(s) => RelayError::Internal(s.clone()),
        }
    }
}

impl From<std::io::Error> for RelayError {
    fn from(e: std::io::Error) -> Self {
        RelayError::Io(Arc::new(e))
    }
}
