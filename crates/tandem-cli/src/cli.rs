//! CLI argument definitions for Tandem.
//!
//! All `clap` structures live here so that `main.rs` stays focused on
//! dispatching subcommands.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use tandem_agent::Mode;

/// Tandem -- a terminal client for a remote reasoning service.
#[derive(Parser)]
#[command(
    name = "tandem",
    version,
    about = "Tandem -- chat with a reasoning service that can act on your workspace",
    long_about = "A conversational client that plans, runs local file and shell tools, \
                  and streams replies from a remote reasoning service."
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by every subcommand.
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Path to a TOML configuration file.
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,

    /// Base URL of the reasoning service.
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    /// Directory the tools operate in.
    #[arg(long, global = true)]
    pub working_dir: Option<PathBuf>,

    /// Default reply mode when the classifier gives no usable answer.
    #[arg(long, global = true, value_enum)]
    pub mode: Option<ModeArg>,

    /// Turn fenced code in conversational replies into file writes.
    #[arg(long, global = true)]
    pub implicit_actions: bool,

    /// Log level used when `RUST_LOG` is not set.
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start an interactive chat session.
    Chat,

    /// Run a single turn and print the reply.
    Ask {
        /// What to say.
        #[arg(required = true, num_args = 1..)]
        utterance: Vec<String>,
    },

    /// Check that the reasoning service is reachable.
    Health,

    /// Inspect sessions stored by the service.
    Sessions {
        #[command(subcommand)]
        action: SessionAction,
    },

    /// Query the service's knowledge base.
    Knowledge {
        #[command(subcommand)]
        action: KnowledgeAction,
    },
}

/// Actions for server-side sessions.
#[derive(Subcommand)]
pub enum SessionAction {
    /// List all sessions.
    List,
    /// Show one session.
    Show {
        /// The session id to display.
        id: String,
    },
    /// Delete a session.
    Delete {
        /// The session id to delete.
        id: String,
    },
}

/// Actions for the knowledge base.
#[derive(Subcommand)]
pub enum KnowledgeAction {
    /// Full-text search.
    Search {
        /// Search query.
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,
    },
    /// List known domains.
    Domains,
    /// Show index statistics.
    Stats,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    General,
    Code,
}

impl From<ModeArg> for Mode {
    fn from(arg: ModeArg) -> Self {
        match arg {
            ModeArg::General => Mode::General,
            ModeArg::Code => Mode::Code,
        }
    }
}
