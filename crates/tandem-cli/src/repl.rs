//! Subcommand: `tandem chat` -- interactive REPL.
//!
//! Each line is one turn.  Reply text is printed as it streams in, and
//! Ctrl+C during a turn cancels just that turn.  At the prompt, Ctrl+C
//! exits.

use std::io::{self, Write as _};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use tandem_agent::{Conversation, Mode, TurnPath};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::helpers::{open_conversation, print_fragment};

/// Slash commands understood by the REPL.
#[derive(Debug, PartialEq, Eq)]
enum SlashCommand {
    Quit,
    Clear,
    History,
    Mode,
    Help,
    Unknown(String),
}

impl SlashCommand {
    /// `None` when the line is an ordinary utterance.
    fn parse(line: &str) -> Option<Self> {
        let command = line.strip_prefix('/')?;
        let name = command.split_whitespace().next().unwrap_or_default();
        Some(match name {
            "quit" | "exit" | "q" => Self::Quit,
            "clear" => Self::Clear,
            "history" => Self::History,
            "mode" => Self::Mode,
            "help" => Self::Help,
            other => Self::Unknown(other.to_owned()),
        })
    }
}

/// The token of the turn in flight, if any.
type ActiveTurn = Arc<Mutex<Option<CancellationToken>>>;

/// Run the interactive REPL.
pub async fn cmd_chat(config: Arc<tandem_agent::ClientConfig>) -> Result<()> {
    let conversation = open_conversation(config)?;
    let mut last_mode: Option<Mode> = None;

    println!();
    println!("  Tandem v{}", env!("CARGO_PKG_VERSION"));
    println!("  Service: {}", conversation.config().base_url);
    println!("  Working directory: {}", conversation.config().working_dir.display());
    println!("  Session: {}", conversation.session().id);
    println!("  Type a message, /help for commands, or /quit to exit.");
    println!();

    let active: ActiveTurn = Arc::new(Mutex::new(None));
    spawn_interrupt_handler(active.clone());

    let stdin = io::stdin();
    let mut line_buf = String::new();

    loop {
        print!("> ");
        io::stdout().flush().ok();

        line_buf.clear();
        match stdin.read_line(&mut line_buf) {
            Ok(0) => {
                println!();
                info!("EOF received, exiting");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                eprintln!("  Error reading input: {e}");
                continue;
            }
        }

        let trimmed = line_buf.trim();
        if trimmed.is_empty() {
            continue;
        }

        if let Some(command) = SlashCommand::parse(trimmed) {
            match command {
                SlashCommand::Quit => break,
                SlashCommand::Clear => {
                    conversation.clear().await;
                    println!("  History cleared.");
                }
                SlashCommand::History => print_history(&conversation).await,
                SlashCommand::Mode => {
                    let mode = last_mode.unwrap_or(conversation.config().default_mode);
                    println!("  Mode: {mode}");
                }
                SlashCommand::Help => print_help(),
                SlashCommand::Unknown(name) => {
                    println!("  Unknown command `/{name}`. Try /help.");
                }
            }
            println!();
            continue;
        }

        let cancel = CancellationToken::new();
        set_active(&active, Some(cancel.clone()));
        let result = conversation.run_turn(trimmed, &cancel, print_fragment).await;
        set_active(&active, None);

        match result {
            Ok(outcome) if outcome.is_cancelled() => {
                println!();
                println!("  (cancelled)");
            }
            Ok(outcome) => {
                println!();
                if outcome.path == TurnPath::Tools {
                    let failed = outcome.reports.iter().filter(|r| !r.succeeded).count();
                    println!(
                        "  ({} tool call{} run, {failed} failed)",
                        outcome.reports.len(),
                        if outcome.reports.len() == 1 { "" } else { "s" },
                    );
                }
                if outcome.mode.is_some() {
                    last_mode = outcome.mode;
                }
            }
            Err(e) => eprintln!("\n  Error: {e}"),
        }
        println!();
    }

    info!("shutting down");
    Ok(())
}

fn set_active(active: &ActiveTurn, token: Option<CancellationToken>) {
    match active.lock() {
        Ok(mut guard) => *guard = token,
        Err(e) => warn!(error = %e, "turn registry poisoned"),
    }
}

/// Ctrl+C cancels the turn in flight, or exits when idle.
fn spawn_interrupt_handler(active: ActiveTurn) {
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            let token = active.lock().ok().and_then(|guard| guard.clone());
            match token {
                Some(token) => token.cancel(),
                None => {
                    eprintln!("\n  Interrupted. Goodbye!");
                    std::process::exit(0);
                }
            }
        }
    });
}

async fn print_history(conversation: &Conversation) {
    let curated = conversation.curated_history().await;
    println!("  {} curated turn(s):", curated.len());
    for (index, turn) in curated.iter().enumerate() {
        let text = turn.text();
        let first_line = text.lines().next().unwrap_or_default();
        let preview: String = first_line.chars().take(60).collect();
        let ellipsis = if preview.len() < text.len() { "..." } else { "" };
        println!("  {:>3}. {:<5} {preview}{ellipsis}", index + 1, turn.role.as_str());
    }
}

fn print_help() {
    println!("  Commands:");
    println!("    /clear     - Start over from a fresh history");
    println!("    /history   - Show the curated history");
    println!("    /mode      - Show the reply mode last used");
    println!("    /quit      - Exit");
    println!("  Ctrl+C cancels a reply in progress.");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slash_commands_parse() {
        assert_eq!(SlashCommand::parse("/quit"), Some(SlashCommand::Quit));
        assert_eq!(SlashCommand::parse("/exit"), Some(SlashCommand::Quit));
        assert_eq!(SlashCommand::parse("/clear"), Some(SlashCommand::Clear));
        assert_eq!(SlashCommand::parse("/history now"), Some(SlashCommand::History));
        assert_eq!(
            SlashCommand::parse("/nope"),
            Some(SlashCommand::Unknown("nope".into()))
        );
        assert_eq!(SlashCommand::parse("write a go server"), None);
    }

    #[test]
    fn clearing_the_active_turn() {
        let active: ActiveTurn = Arc::new(Mutex::new(None));
        let token = CancellationToken::new();
        set_active(&active, Some(token.clone()));
        assert!(active.lock().unwrap().is_some());
        set_active(&active, None);
        assert!(active.lock().unwrap().is_none());
    }
}
