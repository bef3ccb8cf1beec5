//! Top-level config loading pipeline: source → parse → env → validate.

use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::transport::MIN_RECONNECT_DELAY;

use super::defaults::{MAX_HEARTBEAT_SECS, MAX_RECONNECT_DELAY_MS};
use super::env::apply_runtime_env_overrides;
use super::init::config_root_dir;
use super::sources::read_config_text_with_sources;
use super::{Config, ConfigDiagnostics, LoadedConfig};

/// Load configuration from disk and environment.
///
/// `path_override` is the `--config` path.
pub fn load_config(path_override: Option<&Path>) -> Result<Config, ConfigError> {
    Ok(load_config_with_diagnostics(path_override)?.config)
}

/// Load configuration and report where it came from.
pub fn load_config_with_diagnostics(
    path_override: Option<&Path>,
) -> Result<LoadedConfig, ConfigError> {
    load_config_from_sources(
        path_override,
        |path| std::fs::read_to_string(path),
        |name| std::env::var(name).ok(),
        config_root_dir,
    )
}

pub(super) fn load_config_from_sources<FRead, FEnv, FRoot>(
    path_override: Option<&Path>,
    read_file: FRead,
    env_lookup: FEnv,
    config_root: FRoot,
) -> Result<LoadedConfig, ConfigError>
where
    FRead: Fn(&Path) -> Result<String, std::io::Error>,
    FEnv: Fn(&str) -> Option<String>,
    FRoot: Fn() -> Option<PathBuf>,
{
    let (text, source) = read_config_text_with_sources(path_override, &read_file, &config_root)?;
    let mut config: Config = toml::from_str(&text)?;
    apply_runtime_env_overrides(&mut config, &env_lookup)?;
    let mut diagnostics = ConfigDiagnostics::default();
    validate(&mut config, &mut diagnostics)?;
    Ok(LoadedConfig {
        config,
        source: source.path(),
        diagnostics,
    })
}

/// Reject unusable values; clamp the ones with an obvious safe floor.
pub(super) fn validate(
    config: &mut Config,
    diagnostics: &mut ConfigDiagnostics,
) -> Result<(), ConfigError> {
    let url = config.connection.url.trim();
    if !(url.starts_with("ws://") || url.starts_with("wss://")) {
        return Err(ConfigError::Invalid(format!(
            "connection.url `{url}` must start with ws:// or wss://"
        )));
    }
    config.connection.url = url.to_string();

    let reconnect = &mut config.reconnect;
    if !(0.0..=1.0).contains(&reconnect.jitter) {
        return Err(ConfigError::Invalid(format!(
            "reconnect.jitter {} must be between 0.0 and 1.0",
            reconnect.jitter
        )));
    }
    let floor_ms = MIN_RECONNECT_DELAY.as_millis() as u64;
    if reconnect.min_delay_ms < floor_ms {
        diagnostics.warnings.push(format!(
            "reconnect.min_delay_ms {} raised to {floor_ms}",
            reconnect.min_delay_ms
        ));
        reconnect.min_delay_ms = floor_ms;
    }
    if reconnect.max_delay_ms > MAX_RECONNECT_DELAY_MS {
        diagnostics.warnings.push(format!(
            "reconnect.max_delay_ms {} lowered to {MAX_RECONNECT_DELAY_MS}",
            reconnect.max_delay_ms
        ));
        reconnect.max_delay_ms = MAX_RECONNECT_DELAY_MS;
    }
    if reconnect.min_delay_ms > MAX_RECONNECT_DELAY_MS {
        diagnostics.warnings.push(format!(
            "reconnect.min_delay_ms {} lowered to {MAX_RECONNECT_DELAY_MS}",
            reconnect.min_delay_ms
        ));
        reconnect.min_delay_ms = MAX_RECONNECT_DELAY_MS;
    }
    if reconnect.max_delay_ms < reconnect.min_delay_ms {
        diagnostics.warnings.push(format!(
            "reconnect.max_delay_ms {} raised to min_delay_ms {}",
            reconnect.max_delay_ms, reconnect.min_delay_ms
        ));
        reconnect.max_delay_ms = reconnect.min_delay_ms;
    }
    if config.heartbeat.interval_secs > MAX_HEARTBEAT_SECS {
        diagnostics.warnings.push(format!(
            "heartbeat.interval_secs {} lowered to {MAX_HEARTBEAT_SECS}",
            config.heartbeat.interval_secs
        ));
        config.heartbeat.interval_secs = MAX_HEARTBEAT_SECS;
    }

    if config.rpc.timeout_ms == 0 {
        return Err(ConfigError::Invalid(
            "rpc.timeout_ms must be greater than zero".to_string(),
        ));
    }
    if config.connection.connect_timeout_ms == 0 {
        return Err(ConfigError::Invalid(
            "connection.connect_timeout_ms must be greater than zero".to_string(),
        ));
    }
    Ok(())
}
