//! One-shot subcommands: `ask` and the service pass-throughs.

use std::sync::Arc;

use anyhow::Result;
use tandem_agent::{AgentError, ClientConfig};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::cli::{KnowledgeAction, SessionAction};
use crate::helpers::{open_conversation, open_transport, print_fragment, print_json};

/// `tandem ask <utterance>` -- one turn, printed as it streams.
pub async fn cmd_ask(config: Arc<ClientConfig>, utterance: &str) -> Result<()> {
    let conversation = open_conversation(config)?;

    let cancel = CancellationToken::new();
    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };

    let result = conversation.run_turn(utterance, &cancel, print_fragment).await;
    interrupt.abort();
    println!();

    let outcome = result?;
    debug!(
        path = ?outcome.path,
        tool_calls = outcome.tool_calls.len(),
        committed = outcome.committed,
        "turn finished"
    );
    if outcome.is_cancelled() {
        return Err(AgentError::Cancelled.into());
    }
    Ok(())
}

/// `tandem health`.
pub async fn cmd_health(config: Arc<ClientConfig>) -> Result<()> {
    let transport = open_transport(config)?;
    print_json(&transport.health().await?)
}

/// `tandem sessions ...`.
pub async fn cmd_sessions(config: Arc<ClientConfig>, action: SessionAction) -> Result<()> {
    let transport = open_transport(config)?;
    let value = match action {
        SessionAction::List => transport.list_sessions().await?,
        SessionAction::Show { id } => transport.get_session(&id).await?,
        SessionAction::Delete { id } => transport.delete_session(&id).await?,
    };
    print_json(&value)
}

/// `tandem knowledge ...`.
pub async fn cmd_knowledge(config: Arc<ClientConfig>, action: KnowledgeAction) -> Result<()> {
    let transport = open_transport(config)?;
    let value = match action {
        KnowledgeAction::Search { query } => transport.knowledge_search(&query.join(" ")).await?,
        KnowledgeAction::Domains => transport.knowledge_domains().await?,
        KnowledgeAction::Stats => transport.knowledge_stats().await?,
    };
    print_json(&value)
}
