//! CLI entry point for Tandem.
//!
//! This binary provides the `tandem` command: an interactive chat, one-shot
//! questions, and thin wrappers over the service's session and knowledge
//! endpoints.

mod cli;
mod commands;
mod helpers;
mod repl;

use anyhow::Result;
use clap::Parser;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    helpers::init_tracing(&cli.global.log_level);
    let config = helpers::load_config(&cli.global)?;

    match cli.command {
        Commands::Chat => repl::cmd_chat(config).await,
        Commands::Ask { utterance } => commands::cmd_ask(config, &utterance.join(" ")).await,
        Commands::Health => commands::cmd_health(config).await,
        Commands::Sessions { action } => commands::cmd_sessions(config, action).await,
        Commands::Knowledge { action } => commands::cmd_knowledge(config, action).await,
    }
}
