// src/core/commands/fast_path.rs

//! The synthetic-response table: commands the relay can answer immediately
//! while the real command is applied asynchronously.

use crate::core::protocol::RespFrame;
use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Commands whose success replies are predictable. The value is what the
/// real store returns when the command succeeds; the relay hands it to the
/// client before the backend has executed anything.
static FAST_PATH: Lazy<HashMap<&'static str, RespFrame>> = Lazy::new(|| {
    let ok = || RespFrame::SimpleString("OK".to_string());
    let one = || RespFrame::Integer(1);
    HashMap::from([
        ("SET", ok()),
        ("SETEX", ok()),
        ("PSETEX", ok()),
        ("MSET", ok()),
        ("HMSET", ok()),
        ("EXPIRE", one()),
        ("PEXPIRE", one()),
        ("EXPIREAT", one()),
        ("PEXPIREAT", one()),
        ("DEL", one()),
        ("LPUSH", one()),
        ("RPUSH", one()),
        ("SADD", one()),
        ("PING", RespFrame::SimpleString("PONG".to_string())),
    ])
});

/// Looks up the synthetic response for `command`, case-insensitively.
pub fn lookup(command: &str) -> Option<&'static RespFrame> {
    FAST_PATH.get(command.to_ascii_uppercase().as_str())
}
