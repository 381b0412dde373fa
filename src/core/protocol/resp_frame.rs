// src/core/protocol/resp_frame.rs

//! RESP frame representation plus the `Encoder`/`Decoder` pair used to frame
//! network traffic. The relay treats frames as opaque values: it inspects the
//! outermost array of a request to find the command name, and otherwise
//! passes frames through untouched.

use crate::core::errors::RelayError;
use bytes::{Buf, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

const CRLF: &[u8] = b"\r\n";

/// Upper bound on the element count of an array read from the wire.
const MAX_ARRAY_ELEMENTS: usize = 1_024 * 1_024;
/// Upper bound on a single bulk payload (512MB, the protocol's own limit).
const MAX_BULK_LEN: usize = 512 * 1024 * 1024;
/// Nested-array depth guard.
const MAX_DEPTH: usize = 128;

/// A single frame in the RESP protocol, request or response.
#[derive(Debug, Clone, PartialEq)]
pub enum RespFrame {
    SimpleString(String),
    Error(String),
    Integer(i64),
    BulkString(Bytes),
    Null,
    NullArray,
    Array(Vec<RespFrame>),
}

impl RespFrame {
    /// Encodes the frame into a standalone byte vector.
    pub fn encode_to_vec(&self) -> Result<Vec<u8>, RelayError> {
        let mut buf = BytesMut::new();
        RespFrameCodec.encode(self.clone(), &mut buf)?;
        Ok(buf.to_vec())
    }
}

/// A `tokio_util::codec` implementation for `RespFrame`s.
#[derive(Debug, Default)]
pub struct RespFrameCodec;

impl Encoder<RespFrame> for RespFrameCodec {
    type Error = RelayError;

    fn encode(&mut self, item: RespFrame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            RespFrame::SimpleString(s) => {
                dst.extend_from_slice(b"+");
                dst.extend_from_slice(s.as_bytes());
                dst.extend_from_slice(CRLF);
            }
            RespFrame::Error(s) => {
                dst.extend_from_slice(b"-");
                dst.extend_from_slice(s.as_bytes());
                dst.extend_from_slice(CRLF);
            }
            RespFrame::Integer(i) => {
                dst.extend_from_slice(b":");
                dst.extend_from_slice(i.to_string().as_bytes());
                dst.extend_from_slice(CRLF);
            }
            RespFrame::BulkString(payload) => {
                dst.extend_from_slice(b"$");
                dst.extend_from_slice(payload.len().to_string().as_bytes());
                dst.extend_from_slice(CRLF);
                dst.extend_from_slice(&payload);
                dst.extend_from_slice(CRLF);
            }
            RespFrame::Null => dst.extend_from_slice(b"$-1\r\n"),
            RespFrame::NullArray => dst.extend_from_slice(b"*-1\r\n"),
            RespFrame::Array(items) => {
                dst.extend_from_slice(b"*");
                dst.extend_from_slice(items.len().to_string().as_bytes());
                dst.extend_from_slice(CRLF);
                for item in items {
                    self.encode(item, dst)?;
                }
            }
        }
        Ok(())
    }
}

impl Decoder for RespFrameCodec {
    type Item = RespFrame;
    type Error = RelayError;

    /// Attempts to decode one complete frame from the buffer. Returns
    /// `Ok(None)` when the buffer holds only a prefix of a frame.
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }

        let mut cursor = &src[..];
        match decode_frame(&mut cursor, 0) {
            Ok(frame) => {
                let consumed = src.len() - cursor.len();
                src.advance(consumed);
                Ok(Some(frame))
            }
            Err(RelayError::IncompleteData) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Decodes one frame from `cursor`, advancing it past the consumed bytes.
fn decode_frame(cursor: &mut &[u8], depth: usize) -> Result<RespFrame, RelayError> {
    if depth > MAX_DEPTH {
        return Err(RelayError::InvalidRequest(
            "RESP nesting depth limit exceeded".to_string(),
        ));
    }

    let Some((&marker, rest)) = cursor.split_first() else {
        return Err(RelayError::IncompleteData);
    };
    *cursor = rest;

    match marker {
        b'+' => Ok(RespFrame::SimpleString(take_line(cursor)?)),
        b'-' => Ok(RespFrame::Error(take_line(cursor)?)),
        b':' => {
            let line = take_line(cursor)?;
            let value = line.parse::<i64>().map_err(|_| RelayError::SyntaxError)?;
            Ok(RespFrame::Integer(value))
        }
        b'$' => decode_bulk(cursor),
        b'*' => decode_array(cursor, depth),
        _ => Err(RelayError::SyntaxError),
    }
}

/// Consumes bytes up to the next CRLF and returns them as a string.
fn take_line(cursor: &mut &[u8]) -> Result<String, RelayError> {
    let Some(end) = cursor.windows(CRLF.len()).position(|w| w == CRLF) else {
        return Err(RelayError::IncompleteData);
    };
    let line = String::from_utf8_lossy(&cursor[..end]).into_owned();
    *cursor = &cursor[end + CRLF.len()..];
    Ok(line)
}

/// Reads a length header line. `-1` encodes the null sentinel.
fn take_length(cursor: &mut &[u8]) -> Result<Option<usize>, RelayError> {
    let line = take_line(cursor)?;
    let len = line.parse::<isize>().map_err(|_| RelayError::SyntaxError)?;
    if len == -1 {
        return Ok(None);
    }
    usize::try_from(len)
        .map(Some)
        .map_err(|_| RelayError::SyntaxError)
}

fn decode_bulk(cursor: &mut &[u8]) -> Result<RespFrame, RelayError> {
    let Some(len) = take_length(cursor)? else {
        return Ok(RespFrame::Null);
    };
    if len > MAX_BULK_LEN {
        return Err(RelayError::SyntaxError);
    }
    if cursor.len() < len + CRLF.len() {
        return Err(RelayError::IncompleteData);
    }
    if &cursor[len..len + CRLF.len()] != CRLF {
        return Err(RelayError::SyntaxError);
    }
    let payload = Bytes::copy_from_slice(&cursor[..len]);
    *cursor = &cursor[len + CRLF.len()..];
    Ok(RespFrame::BulkString(payload))
}

fn decode_array(cursor: &mut &[u8], depth: usize) -> Result<RespFrame, RelayError> {
    let Some(count) = take_length(cursor)? else {
        return Ok(RespFrame::NullArray);
    };
    if count > MAX_ARRAY_ELEMENTS {
        return Err(RelayError::SyntaxError);
    }
    let mut items = Vec::with_capacity(count.min(1024));
    for _ in 0..count {
        items.push(decode_frame(cursor, depth + 1)?);
    }
    Ok(RespFrame::Array(items))
}
