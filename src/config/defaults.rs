//! Default configuration constants.

/// Embedded default `runwire.toml` written by `runwire init`.
pub(super) const DEFAULT_CONFIG_TEMPLATE: &str = include_str!("../templates/runwire.toml");
/// Local runner endpoint.
pub(super) const DEFAULT_URL: &str = "ws://127.0.0.1:8000/ws";
pub(super) const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;
pub(super) const DEFAULT_MIN_DELAY_MS: u64 = 500;
pub(super) const DEFAULT_MAX_DELAY_MS: u64 = 30_000;
pub(super) const DEFAULT_MAX_ATTEMPTS: u32 = 10;
pub(super) const DEFAULT_JITTER: f64 = 0.2;
pub(super) const DEFAULT_HEARTBEAT_SECS: u64 = 30;
pub(super) const DEFAULT_RPC_TIMEOUT_MS: u64 = 30_000;

/// Longest heartbeat period accepted (one day).
pub(super) const MAX_HEARTBEAT_SECS: u64 = 86_400;
/// Longest reconnect delay accepted (one hour).
pub(super) const MAX_RECONNECT_DELAY_MS: u64 = 3_600_000;

/// Canonical file name, both locally and under the config root.
pub(super) const CONFIG_FILE_NAME: &str = "runwire.toml";
/// Directory under the config root.
pub(super) const CONFIG_DIR_NAME: &str = "runwire";
