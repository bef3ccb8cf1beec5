//! Config-file source discovery.
//!
//! Order: explicit path > local file > global file > built-in defaults.

use std::path::{Path, PathBuf};

use crate::error::ConfigError;

use super::defaults::{CONFIG_DIR_NAME, CONFIG_FILE_NAME};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum ConfigSource {
    /// `--config <path>`.
    Explicit(PathBuf),
    /// `./runwire.toml`.
    Local,
    /// `<config root>/runwire/runwire.toml`.
    Global(PathBuf),
    BuiltInDefaults,
}

impl ConfigSource {
    pub(super) fn path(&self) -> Option<PathBuf> {
        match self {
            Self::Explicit(path) | Self::Global(path) => Some(path.clone()),
            Self::Local => Some(PathBuf::from(CONFIG_FILE_NAME)),
            Self::BuiltInDefaults => None,
        }
    }
}

/// Read config text from the highest-precedence available source.
///
/// An explicit path must exist; the implicit locations are skipped when
/// unreadable.
pub(super) fn read_config_text_with_sources<FRead, FRoot>(
    path_override: Option<&Path>,
    read_file: &FRead,
    config_root: &FRoot,
) -> Result<(String, ConfigSource), ConfigError>
where
    FRead: Fn(&Path) -> Result<String, std::io::Error>,
    FRoot: Fn() -> Option<PathBuf>,
{
    if let Some(path) = path_override {
        let text = read_file(path)?;
        return Ok((text, ConfigSource::Explicit(path.to_path_buf())));
    }
    if let Ok(text) = read_file(Path::new(CONFIG_FILE_NAME)) {
        return Ok((text, ConfigSource::Local));
    }
    if let Some(dir) = config_root() {
        let global = dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME);
        if let Ok(text) = read_file(&global) {
            return Ok((text, ConfigSource::Global(global)));
        }
    }
    Ok((String::new(), ConfigSource::BuiltInDefaults))
}
