//! Compile-time build metadata for the CLI.

/// Semver package version from `Cargo.toml`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// VCS commit hash captured at build time.
pub const GIT_COMMIT: &str = env!("RUNWIRE_BUILD_GIT_HASH");

/// Build timestamp captured at compile time.
pub const BUILD_TIMESTAMP: &str = env!("RUNWIRE_BUILD_TIMESTAMP");

/// Render the block printed by `runwire --version`.
pub fn cli_version_text() -> String {
    format!("runwire {VERSION}\ncommit: {GIT_COMMIT}\nbuilt: {BUILD_TIMESTAMP}")
}
