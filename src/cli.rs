//! CLI argument parsing via clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Terminal client for workflow runners speaking the runwire protocol.
#[derive(Debug, Parser)]
#[command(name = "runwire", disable_version_flag = true)]
pub struct Args {
    /// Path to config file (default: ./runwire.toml or ~/.config/runwire/runwire.toml).
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<PathBuf>,

    /// Disable color output.
    #[arg(long = "no-color", global = true)]
    pub no_color: bool,

    /// Print version, commit, and build time.
    #[arg(short = 'V', long = "version")]
    pub version: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, PartialEq, Eq)]
pub enum Command {
    /// Stream a run and answer its prompts from stdin.
    Connect {
        /// Override the runner URL.
        #[arg(long = "url")]
        url: Option<String>,

        /// Step-debug mode: stdin lines are control codes (c, s, r, q, ab <bp>, ...).
        #[arg(long = "step")]
        step: bool,
    },
    /// Normalize a breakpoint and print its wire and display forms.
    Breakpoint {
        /// `*`, an event type, `agent:<name>`, or `agent_event:<name>:<type>`.
        spec: String,
    },
    /// Write the default config to ~/.config/runwire/runwire.toml.
    Init {
        /// Replace an existing file, keeping a timestamped backup.
        #[arg(long = "force")]
        force: bool,
    },
}
