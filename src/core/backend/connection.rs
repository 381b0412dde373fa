// src/core/backend/connection.rs

//! One TCP connection to the backend store, speaking RESP with bounded
//! connect, write, and read times.

use crate::core::errors::RelayError;
use crate::core::protocol::{RespFrame, RespFrameCodec};
use bytes::BytesMut;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::codec::{Decoder, Encoder};

pub struct BackendConnection {
    stream: TcpStream,
    codec: RespFrameCodec,
    read_buf: BytesMut,
    request_timeout: Duration,
}

impl BackendConnection {
    /// Establishes a connection to the backend with a connect timeout.
    pub async fn connect(
        addr: &str,
        connect_timeout: Duration,
        request_timeout: Duration,
    ) -> Result<Self, RelayError> {
        let stream = tokio::time::timeout(connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| RelayError::BackendTimeout(format!("connect to {addr}")))??;
        Ok(Self {
            stream,
            codec: RespFrameCodec,
            read_buf: BytesMut::with_capacity(4096),
            request_timeout,
        })
    }

    /// Sends one command frame and reads exactly one reply frame.
    pub async fn exchange(&mut self, frame: RespFrame) -> Result<RespFrame, RelayError> {
        let mut write_buf = BytesMut::new();
        self.codec.encode(frame, &mut write_buf)?;
        tokio::time::timeout(self.request_timeout, self.stream.write_all(&write_buf))
            .await
            .map_err(|_| RelayError::BackendTimeout("write".to_string()))??;

        loop {
            if let Some(reply) = self.codec.decode(&mut self.read_buf)? {
                return Ok(reply);
            }
            let n = tokio::time::timeout(
                self.request_timeout,
                self.stream.read_buf(&mut self.read_buf),
            )
            .await
            .map_err(|_| RelayError::BackendTimeout("read".to_string()))??;
            if n == 0 {
                return Err(RelayError::ConnectionClosed);
            }
        }
    }
}
