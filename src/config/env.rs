//! Environment overrides.
//!
//! `RUNWIRE_*` variables win over every file source. Blank values are
//! ignored; values that don't parse are errors rather than silent fallbacks.

use crate::error::ConfigError;

use super::Config;

pub(super) const ENV_URL: &str = "RUNWIRE_URL";
pub(super) const ENV_RPC_TIMEOUT_MS: &str = "RUNWIRE_RPC_TIMEOUT_MS";
pub(super) const ENV_HEARTBEAT_SECS: &str = "RUNWIRE_HEARTBEAT_SECS";

pub(super) fn apply_runtime_env_overrides<FEnv>(
    config: &mut Config,
    env_lookup: &FEnv,
) -> Result<(), ConfigError>
where
    FEnv: Fn(&str) -> Option<String>,
{
    if let Some(url) = non_blank(env_lookup, ENV_URL) {
        config.connection.url = url;
    }
    if let Some(timeout) = non_blank(env_lookup, ENV_RPC_TIMEOUT_MS) {
        config.rpc.timeout_ms = parse_u64(ENV_RPC_TIMEOUT_MS, &timeout, "milliseconds")?;
    }
    if let Some(interval) = non_blank(env_lookup, ENV_HEARTBEAT_SECS) {
        config.heartbeat.interval_secs = parse_u64(ENV_HEARTBEAT_SECS, &interval, "seconds")?;
    }
    Ok(())
}

fn non_blank<FEnv>(env_lookup: &FEnv, name: &str) -> Option<String>
where
    FEnv: Fn(&str) -> Option<String>,
{
    env_lookup(name)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_u64(name: &str, value: &str, unit: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| {
        ConfigError::Invalid(format!(
            "invalid {name} value `{value}`: expected non-negative integer {unit}"
        ))
    })
}
