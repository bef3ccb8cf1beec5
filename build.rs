//! Embeds build metadata for `runwire --version`.
//!
//! Values can be pinned from the environment for reproducible builds; otherwise
//! they are probed from git/date and fall back to "unknown".

use std::env;
use std::process::Command;
use std::time::{SystemTime, UNIX_EPOCH};

const HASH_VAR: &str = "RUNWIRE_BUILD_GIT_HASH";
const TIMESTAMP_VAR: &str = "RUNWIRE_BUILD_TIMESTAMP";

fn main() {
    println!("cargo:rerun-if-changed=.git/HEAD");
    if let Some(reference) = head_reference() {
        println!("cargo:rerun-if-changed=.git/{reference}");
    }
    println!("cargo:rerun-if-env-changed={HASH_VAR}");
    println!("cargo:rerun-if-env-changed={TIMESTAMP_VAR}");

    let hash = env::var(HASH_VAR).ok().or_else(|| {
        probe("git", &["rev-parse", "--short=12", "HEAD"])
    });
    let timestamp = env::var(TIMESTAMP_VAR)
        .ok()
        .or_else(|| probe("date", &["-u", "+%Y-%m-%dT%H:%M:%SZ"]))
        .unwrap_or_else(unix_timestamp);

    println!(
        "cargo:rustc-env={HASH_VAR}={}",
        hash.unwrap_or_else(|| "unknown".to_string())
    );
    println!("cargo:rustc-env={TIMESTAMP_VAR}={timestamp}");
}

fn head_reference() -> Option<String> {
    let head = std::fs::read_to_string(".git/HEAD").ok()?;
    head.trim().strip_prefix("ref: ").map(str::to_string)
}

fn unix_timestamp() -> String {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    format!("unix:{secs}")
}

fn probe(program: &str, args: &[&str]) -> Option<String> {
    let output = Command::new(program).args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let text = String::from_utf8(output.stdout).ok()?;
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}
