// src/core/commands/mod.rs

//! Command-level knowledge consumed by the relay core.

pub mod fast_path;
