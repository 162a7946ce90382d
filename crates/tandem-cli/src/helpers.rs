//! Shared helper functions used across CLI subcommands.
//!
//! Includes tracing initialization, configuration assembly, and the
//! construction of a ready-to-use [`Conversation`].

use std::io::{self, Write as _};
use std::sync::Arc;

use anyhow::{Context, Result};
use tandem_agent::{ClientConfig, Conversation, ToolRegistry, TransportClient};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::cli::GlobalArgs;

// ---------------------------------------------------------------------------
// Tracing
// ---------------------------------------------------------------------------

/// Initialize the tracing subscriber with the given default log level.
///
/// Logs go to stderr so they never interleave with streamed reply text.
pub fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .compact()
        .init();
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Assemble the configuration: `.env`, then the TOML file, then `TANDEM_*`
/// variables, then command-line flags.
pub fn load_config(args: &GlobalArgs) -> Result<Arc<ClientConfig>> {
    // A missing .env is fine.
    let _ = dotenvy::dotenv();

    let config = match &args.config {
        Some(path) => ClientConfig::load(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => ClientConfig::default(),
    };
    let config = apply_flags(config.apply_env()?, args);
    config.validate().context("invalid configuration")?;

    info!(
        base_url = %config.base_url,
        working_dir = %config.working_dir.display(),
        mode = %config.default_mode,
        "configuration loaded"
    );
    Ok(Arc::new(config))
}

fn apply_flags(mut config: ClientConfig, args: &GlobalArgs) -> ClientConfig {
    if let Some(url) = &args.base_url {
        config.base_url = url.clone();
    }
    if let Some(dir) = &args.working_dir {
        config.working_dir = dir.clone();
    }
    if let Some(mode) = args.mode {
        config.default_mode = mode.into();
    }
    if args.implicit_actions {
        config.implicit_actions = true;
    }
    config
}

/// Build a conversation wired to the reference tool pack.
pub fn open_conversation(config: Arc<ClientConfig>) -> Result<Conversation> {
    let registry: Arc<dyn ToolRegistry> =
        Arc::new(tandem_tools::default_registry(&config.working_dir));
    Conversation::new(config, Some(registry)).context("failed to start conversation")
}

/// A bare transport for the pass-through commands.
pub fn open_transport(config: Arc<ClientConfig>) -> Result<TransportClient> {
    TransportClient::new(config).context("failed to create transport client")
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

/// Print a streamed fragment immediately.
pub fn print_fragment(fragment: &str) {
    print!("{fragment}");
    io::stdout().flush().ok();
}

/// Pretty-print a JSON value returned by the service.
pub fn print_json(value: &serde_json::Value) -> Result<()> {
    let formatted = serde_json::to_string_pretty(value).context("failed to format response")?;
    println!("{formatted}");
    Ok(())
}
