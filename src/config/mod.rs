//! Configuration loading from TOML files and environment variables.
//!
//! Config is loaded in this order of precedence (highest wins):
//! 1. Environment variables (`RUNWIRE_URL`, `RUNWIRE_RPC_TIMEOUT_MS`,
//!    `RUNWIRE_HEARTBEAT_SECS`)
//! 2. TOML file specified via --config CLI flag
//! 3. ./runwire.toml in the current directory
//! 4. $XDG_CONFIG_HOME/runwire/runwire.toml (or ~/.config/runwire/runwire.toml)
//! 5. Built-in defaults

mod defaults;
mod env;
mod init;
mod loader;
mod sources;
mod types;

pub use init::{config_root_dir, default_global_config_path, initialize_default_global_config};
pub use loader::{load_config, load_config_with_diagnostics};
pub use types::{
    Config, ConfigDiagnostics, ConnectionConfig, DedupConfig, GlobalConfigInitResult,
    HeartbeatConfig, LoadedConfig, ReconnectConfig, RpcConfig,
};
