// src/core/compress.rs

//! zstd compression for oversized argument payloads, and its reversal on the
//! response path. Compressed payloads carry a marker prefix so the response
//! path can tell them apart from application bytes.

use crate::core::errors::RelayError;
use crate::core::protocol::RespFrame;
use bytes::{BufMut, Bytes, BytesMut};
use tracing::warn;

/// Prefix identifying a payload this relay compressed.
const MAGIC: &[u8] = b"@zst1";

/// Compresses a payload and prefixes the marker.
pub fn compress_payload(data: &[u8]) -> Result<Bytes, RelayError> {
    let compressed = zstd::encode_all(data, 0)
        .map_err(|e| RelayError::Internal(format!("zstd encode failed: {e}")))?;
    let mut out = BytesMut::with_capacity(MAGIC.len() + compressed.len());
    out.put_slice(MAGIC);
    out.put_slice(&compressed);
    Ok(out.freeze())
}

/// Reverses `compress_payload`. Payloads without the marker pass through
/// untouched; a marked payload that fails to decode is forwarded as-is
/// rather than failing the request.
pub fn maybe_decompress(data: &Bytes) -> Bytes {
    let Some(body) = data.strip_prefix(MAGIC) else {
        return data.clone();
    };
    match zstd::decode_all(body) {
        Ok(raw) => Bytes::from(raw),
        Err(e) => {
            warn!("failed to decompress marked payload: {e}");
            data.clone()
        }
    }
}

/// Walks a response frame and decompresses any marked bulk payloads,
/// recursing into arrays.
pub fn decompress_frame(frame: RespFrame) -> RespFrame {
    match frame {
        RespFrame::BulkString(data) => RespFrame::BulkString(maybe_decompress(&data)),
        RespFrame::Array(items) => {
            RespFrame::Array(items.into_iter().map(decompress_frame).collect())
        }
        other => other,
    }
}
