// src/core/protocol/mod.rs

//! The RESP wire protocol used on both the client-facing and the
//! backend-facing sockets.

mod resp_frame;

pub use resp_frame::{RespFrame, RespFrameCodec};
