//! Configuration data model.
//!
//! File sections deserialize with `#[serde(default)]` so a partial file only
//! overrides what it names. Durations are stored as integers in the unit the
//! key names and converted at the edges.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::defaults::{
    DEFAULT_CONNECT_TIMEOUT_MS, DEFAULT_HEARTBEAT_SECS, DEFAULT_MAX_ATTEMPTS,
    DEFAULT_MAX_DELAY_MS, DEFAULT_MIN_DELAY_MS, DEFAULT_JITTER, DEFAULT_RPC_TIMEOUT_MS,
    DEFAULT_URL,
};
use crate::dedup::{DedupOptions, DEFAULT_MAX_CACHE_SIZE};
use crate::session::SessionOptions;
use crate::transport::{ReconnectPolicy, TransportOptions};

/// Top-level runtime configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub connection: ConnectionConfig,
    pub reconnect: ReconnectConfig,
    pub heartbeat: HeartbeatConfig,
    pub rpc: RpcConfig,
    pub dedup: DedupConfig,
}

impl Config {
    /// Settings for [`crate::transport::WsTransport::spawn`].
    pub fn transport_options(&self) -> TransportOptions {
        TransportOptions {
            url: self.connection.url.clone(),
            connect_timeout: Duration::from_millis(self.connection.connect_timeout_ms),
            reconnect: ReconnectPolicy {
                enabled: self.reconnect.enabled,
                min_delay: Duration::from_millis(self.reconnect.min_delay_ms),
                max_delay: Duration::from_millis(self.reconnect.max_delay_ms),
                max_attempts: self.reconnect.max_attempts,
                jitter: self.reconnect.jitter,
            },
            heartbeat: (self.heartbeat.interval_secs > 0)
                .then(|| Duration::from_secs(self.heartbeat.interval_secs)),
        }
    }

    /// Settings for [`crate::session::RunSession::new`].
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            dedup: DedupOptions {
                enabled: self.dedup.enabled,
                max_cache_size: self.dedup.max_cache_size,
            },
            rpc_timeout: Duration::from_millis(self.rpc.timeout_ms),
        }
    }
}

/// `[connection]`
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// `ws://` or `wss://` endpoint of the runner.
    pub url: String,
    pub connect_timeout_ms: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
        }
    }
}

/// `[reconnect]`
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ReconnectConfig {
    pub enabled: bool,
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
    /// `0` retries forever.
    pub max_attempts: u32,
    pub jitter: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_delay_ms: DEFAULT_MIN_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            jitter: DEFAULT_JITTER,
        }
    }
}

/// `[heartbeat]`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    /// Seconds between pings; `0` disables.
    pub interval_secs: u64,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval_secs: DEFAULT_HEARTBEAT_SECS,
        }
    }
}

/// `[rpc]`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct RpcConfig {
    pub timeout_ms: u64,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_RPC_TIMEOUT_MS,
        }
    }
}

/// `[dedup]`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct DedupConfig {
    pub enabled: bool,
    pub max_cache_size: usize,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_cache_size: DEFAULT_MAX_CACHE_SIZE,
        }
    }
}

/// Non-fatal notes produced while loading, e.g. clamped values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigDiagnostics {
    pub warnings: Vec<String>,
}

/// Config plus where it came from.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: Config,
    /// File the config was read from; `None` when only defaults applied.
    pub source: Option<PathBuf>,
    pub diagnostics: ConfigDiagnostics,
}

/// Outcome of `runwire init`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GlobalConfigInitResult {
    Created { path: PathBuf },
    AlreadyInitialized { path: PathBuf },
    Overwritten { path: PathBuf, backup_path: PathBuf },
}
