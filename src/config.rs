// src/config.rs

//! Relay configuration: loading, defaults, and validation.

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;

/// The relay's operating mode with respect to asynchronous semantics.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum RelayMode {
    /// Answer classifier-registered commands immediately with a synthetic
    /// reply while the real command executes asynchronously.
    FastPath,
    /// Every command waits for its real backend response.
    #[default]
    Synchronous,
}

/// Settings for the per-connection dispatch machinery.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RelayConfig {
    #[serde(default)]
    pub mode: RelayMode,
    /// When true, a connection may run several dispatch workers at once and
    /// reorders their completions back into request order.
    #[serde(default)]
    pub concurrent_dispatch: bool,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            mode: RelayMode::default(),
            concurrent_dispatch: false,
        }
    }
}

/// Where and how to reach the real store.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct BackendConfig {
    #[serde(default = "default_backend_addr")]
    pub addr: String,
    #[serde(default = "default_backend_max_connections")]
    pub max_connections: usize,
    #[serde(with = "humantime_serde", default = "default_connect_timeout")]
    pub connect_timeout: Duration,
    #[serde(with = "humantime_serde", default = "default_request_timeout")]
    pub request_timeout: Duration,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            addr: default_backend_addr(),
            max_connections: default_backend_max_connections(),
            connect_timeout: default_connect_timeout(),
            request_timeout: default_request_timeout(),
        }
    }
}

/// Payload compression settings.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CompressionConfig {
    /// Compress oversized argument payloads before dispatch.
    #[serde(default)]
    pub compress: bool,
    /// Decompress marked payloads in responses even when `compress` is off.
    #[serde(default)]
    pub uncompress: bool,
    /// Payloads below this size are never compressed.
    #[serde(default = "default_min_compress_size")]
    pub min_size: usize,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            compress: false,
            uncompress: false,
            min_size: default_min_compress_size(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Config {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_max_clients")]
    pub max_clients: usize,
    /// Rolling deadline for each client read; expiry re-arms, it does not
    /// close the connection.
    #[serde(with = "humantime_serde", default = "default_read_idle_timeout")]
    pub read_idle_timeout: Duration,
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub compression: CompressionConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
            max_clients: default_max_clients(),
            read_idle_timeout: default_read_idle_timeout(),
            relay: RelayConfig::default(),
            backend: BackendConfig::default(),
            compression: CompressionConfig::default(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    6380
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_max_clients() -> usize {
    10_000
}
fn default_read_idle_timeout() -> Duration {
    Duration::from_secs(15)
}
fn default_backend_addr() -> String {
    "127.0.0.1:6379".to_string()
}
fn default_backend_max_connections() -> usize {
    16
}
fn default_connect_timeout() -> Duration {
    Duration::from_secs(2)
}
fn default_request_timeout() -> Duration {
    Duration::from_secs(3)
}
fn default_min_compress_size() -> usize {
    256
}

impl Config {
    /// Creates a new `Config` instance by reading and parsing a TOML file.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file at '{path}'"))?;
        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse TOML from '{path}'"))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the resolved configuration for logical consistency.
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(anyhow!("port cannot be 0"));
        }
        if self.host.trim().is_empty() {
            return Err(anyhow!("host cannot be empty"));
        }
        if self.max_clients == 0 {
            return Err(anyhow!("max_clients cannot be 0"));
        }
        if self.read_idle_timeout.is_zero() {
            return Err(anyhow!("read_idle_timeout cannot be 0"));
        }
        if self.backend.addr.trim().is_empty() {
            return Err(anyhow!("backend addr cannot be empty"));
        }
        if self.backend.max_connections == 0 {
            return Err(anyhow!("backend max_connections cannot be 0"));
        }
        Ok(())
    }

    /// Ceiling on concurrent dispatch workers per connection, derived from
    /// the backend pool capacity.
    pub fn max_dispatch_workers(&self) -> usize {
        self.backend.max_connections / 2 + 1
    }
}
