//! CLI command definitions for the `chatloom` binary.
//!
//! Uses clap derive macros for argument parsing.

pub mod chat;
pub mod key;
pub mod session;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

/// Chat with Gemini from the terminal.
#[derive(Parser)]
#[command(name = "chatloom", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, short, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Keep everything in memory; nothing is read from or written to disk.
    #[arg(long, global = true)]
    pub ephemeral: bool,

    /// Export trace spans through OpenTelemetry (stdout exporter).
    #[arg(long, global = true)]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start an interactive chat.
    Chat {
        /// Resume a session by list number or id prefix.
        #[arg(long, short)]
        session: Option<String>,

        /// Start in a new session.
        #[arg(long, conflicts_with = "session")]
        new: bool,

        /// Send one message, print the reply and exit.
        #[arg(long, short)]
        message: Option<String>,
    },

    /// List stored sessions.
    #[command(alias = "ls")]
    Sessions,

    /// Delete a stored session.
    #[command(alias = "rm")]
    Delete {
        /// List number or id prefix.
        session: String,

        /// Skip confirmation prompt.
        #[arg(long)]
        force: bool,
    },

    /// Store the Gemini API key.
    SetKey {
        /// Key value (prompted for when omitted).
        #[arg(long)]
        value: Option<String>,

        /// Store without checking the key against the API.
        #[arg(long)]
        no_verify: bool,
    },

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

impl Cli {
    /// Log filter for the requested verbosity.
    pub fn log_filter(&self) -> &'static str {
        match self.verbose {
            0 if self.quiet => "error",
            0 => "warn",
            1 => "info,chatloom_core=debug,chatloom_infra=debug",
            _ => "trace",
        }
    }
}
