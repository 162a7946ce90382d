//! Turn orchestration.
//!
//! A [`Conversation`] owns one history and runs one turn at a time:
//!
//! ```text
//! Idle → Planning ─┬─ Executing ─────────────────────────┬─ Synthesizing → Committing → Idle
//!                  └─ Streaming → ExtractingImplicit ────┘
//!           (transport / protocol failure) → ErrorReporting → Idle
//! ```
//!
//! The user turn is appended speculatively when the turn starts.  It is
//! removed again if the turn is cancelled before anything was committed,
//! and on the synchronous path if the service cannot be reached.

use std::fmt;
use std::sync::Arc;

use tokio::sync::{Mutex, watch};
use tokio_util::sync::CancellationToken;
use tracing::{info, trace, warn};

use crate::config::ClientConfig;
use crate::error::Result;
use crate::executor::{ToolExecutionReport, ToolExecutor};
use crate::history::{ConversationStore, ConversationTurn, RawTurn};
use crate::intent::{
    Decision, IntentResolver, ModeSelector, PlanningContext, RemotePlanner,
};
use crate::seed::build_seed_turns;
use crate::synthesizer::ResponseSynthesizer;
use crate::tools::{ToolCall, ToolRegistry};
use crate::transport::{Mode, Session, TransportClient};

// ---------------------------------------------------------------------------
// Turn state
// ---------------------------------------------------------------------------

/// Where the current turn is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TurnState {
    Idle,
    Planning,
    Executing,
    Streaming,
    ExtractingImplicit,
    Synthesizing,
    Committing,
    ErrorReporting,
}

impl TurnState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Planning => "planning",
            Self::Executing => "executing",
            Self::Streaming => "streaming",
            Self::ExtractingImplicit => "extracting_implicit",
            Self::Synthesizing => "synthesizing",
            Self::Committing => "committing",
            Self::ErrorReporting => "error_reporting",
        }
    }
}

impl fmt::Display for TurnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which path a turn took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPath {
    Tools,
    Conversational,
}

/// Result of one turn.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutcome {
    /// Model text as committed (or as far as it got, if not committed).
    pub reply: String,
    pub path: TurnPath,
    /// Mode used for the conversational reply.
    pub mode: Option<Mode>,
    pub tool_calls: Vec<ToolCall>,
    pub reports: Vec<ToolExecutionReport>,
    /// Whether the user/model pair was added to the history.
    pub committed: bool,
}

impl TurnOutcome {
    fn cancelled(path: TurnPath) -> Self {
        Self {
            reply: String::new(),
            path,
            mode: None,
            tool_calls: Vec::new(),
            reports: Vec::new(),
            committed: false,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        !self.committed
    }
}

/// How the conversational reply is obtained.
enum Delivery<'a> {
    Stream(&'a mut (dyn FnMut(&str) + Send)),
    Blocking,
}

impl Delivery<'_> {
    fn emit(&mut self, text: &str) {
        if let Self::Stream(on_fragment) = self {
            (**on_fragment)(text);
        }
    }
}

// ---------------------------------------------------------------------------
// Conversation
// ---------------------------------------------------------------------------

/// One conversation with the reasoning service.
pub struct Conversation {
    config: Arc<ClientConfig>,
    transport: TransportClient,
    resolver: IntentResolver,
    mode_selector: ModeSelector,
    synthesizer: ResponseSynthesizer,
    registry: Option<Arc<dyn ToolRegistry>>,
    /// History, locked for the whole duration of a turn.
    store: Mutex<ConversationStore>,
    state: watch::Sender<TurnState>,
}

impl Conversation {
    /// Create a conversation with a fresh session and seeded history.
    pub fn new(
        config: Arc<ClientConfig>,
        registry: Option<Arc<dyn ToolRegistry>>,
    ) -> Result<Self> {
        let transport = TransportClient::new(config.clone())?;
        let executor = ToolExecutor::new(registry.clone(), config.tool_timeout());

        let mut store = ConversationStore::new();
        for turn in build_seed_turns(&config) {
            store.append(turn);
        }

        let (state, _) = watch::channel(TurnState::Idle);

        info!(
            session_id = %transport.session().id,
            tools = registry.as_ref().map_or(0, |r| r.function_declarations().len()),
            "conversation started"
        );

        Ok(Self {
            resolver: IntentResolver::new(Box::new(RemotePlanner::new(transport.clone()))),
            mode_selector: ModeSelector::new(transport.clone(), config.default_mode),
            synthesizer: ResponseSynthesizer::new(
                transport.clone(),
                executor,
                config.implicit_actions,
            ),
            store: Mutex::new(store),
            config,
            transport,
            registry,
            state,
        })
    }

    /// Replace the intent resolver.
    pub fn with_resolver(mut self, resolver: IntentResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn session(&self) -> &Session {
        self.transport.session()
    }

    pub fn transport(&self) -> &TransportClient {
        &self.transport
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn state(&self) -> TurnState {
        *self.state.borrow()
    }

    /// Watch state transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<TurnState> {
        self.state.subscribe()
    }

    pub async fn history_snapshot(&self) -> Vec<ConversationTurn> {
        self.store.lock().await.snapshot()
    }

    pub async fn curated_history(&self) -> Vec<ConversationTurn> {
        self.store.lock().await.curate()
    }

    /// Drop everything and start again from the seed turns.
    pub async fn clear(&self) {
        let seed = build_seed_turns(&self.config);
        let mut store = self.store.lock().await;
        store.clear();
        for turn in seed {
            store.append(turn);
        }
        info!(session_id = %self.session().id, "history cleared");
    }

    /// Replace the history.  Rejected without change on an unknown role.
    pub async fn set_history(&self, turns: Vec<RawTurn>) -> Result<()> {
        self.store.lock().await.set_history(turns)
    }

    // -----------------------------------------------------------------------
    // Turns
    // -----------------------------------------------------------------------

    /// Run one turn, relaying reply text to `on_fragment` as it arrives.
    ///
    /// Tool replies arrive as one fragment.  If `cancel` fires during a
    /// conversational reply the history is left as it was before the turn.
    pub async fn run_turn<F>(
        &self,
        utterance: &str,
        cancel: &CancellationToken,
        mut on_fragment: F,
    ) -> Result<TurnOutcome>
    where
        F: FnMut(&str) + Send,
    {
        self.run(utterance, cancel, Delivery::Stream(&mut on_fragment))
            .await
    }

    /// Run one turn and return the whole reply.
    ///
    /// If the service cannot be reached the user turn is rolled back and the
    /// error returned.
    pub async fn send_message(&self, utterance: &str) -> Result<TurnOutcome> {
        self.run(utterance, &CancellationToken::new(), Delivery::Blocking)
            .await
    }

    async fn run(
        &self,
        utterance: &str,
        cancel: &CancellationToken,
        mut delivery: Delivery<'_>,
    ) -> Result<TurnOutcome> {
        let mut store = self.store.lock().await;

        if cancel.is_cancelled() {
            return Ok(TurnOutcome::cancelled(TurnPath::Conversational));
        }

        info!(session_id = %self.session().id, chars = utterance.len(), "turn started");

        let recent = store.recent_curated(self.config.history_window);
        store.append(ConversationTurn::user(utterance));

        self.transition(TurnState::Planning);
        let declarations = self
            .registry
            .as_ref()
            .map(|r| r.function_declarations())
            .unwrap_or_default();
        let decision = self
            .resolver
            .resolve(&PlanningContext {
                utterance,
                recent: &recent,
                working_dir: &self.config.working_dir,
                declarations: &declarations,
            })
            .await;

        if cancel.is_cancelled() {
            return Ok(self.abandon(&mut store, TurnPath::Conversational));
        }

        let outcome = if decision.needs_tools {
            self.tool_turn(decision, cancel, &mut delivery).await
        } else {
            self.conversational_turn(utterance, cancel, &mut delivery)
                .await
        };

        match outcome {
            Ok(outcome) if outcome.committed => {
                self.transition(TurnState::Committing);
                store.append(ConversationTurn::model(outcome.reply.clone()));
                self.transition(TurnState::Idle);
                info!(
                    path = ?outcome.path,
                    reply_chars = outcome.reply.len(),
                    history = store.len(),
                    "turn committed"
                );
                Ok(outcome)
            }
            Ok(outcome) => Ok(self.abandon(&mut store, outcome.path)),
            Err(e) => {
                self.transition(TurnState::ErrorReporting);
                warn!(error = %e, "turn failed");
                if matches!(delivery, Delivery::Blocking) {
                    store.pop_last_user();
                }
                self.transition(TurnState::Idle);
                Err(e)
            }
        }
    }

    async fn tool_turn(
        &self,
        decision: Decision,
        cancel: &CancellationToken,
        delivery: &mut Delivery<'_>,
    ) -> Result<TurnOutcome> {
        info!(calls = decision.tool_calls.len(), source = ?decision.source, "running tool plan");
        self.transition(TurnState::Executing);

        let (reply, outcome) = self
            .synthesizer
            .tool_reply(&decision.tool_calls, cancel)
            .await;

        if outcome.cancelled && outcome.reports.is_empty() {
            return Ok(TurnOutcome::cancelled(TurnPath::Tools));
        }

        self.transition(TurnState::Synthesizing);
        delivery.emit(&reply);

        Ok(TurnOutcome {
            reply,
            path: TurnPath::Tools,
            mode: None,
            tool_calls: decision.tool_calls,
            reports: outcome.reports,
            committed: true,
        })
    }

    async fn conversational_turn(
        &self,
        utterance: &str,
        cancel: &CancellationToken,
        delivery: &mut Delivery<'_>,
    ) -> Result<TurnOutcome> {
        let mode = self.mode_selector.select(utterance).await;
        if cancel.is_cancelled() {
            return Ok(TurnOutcome::cancelled(TurnPath::Conversational));
        }

        self.transition(TurnState::Streaming);
        let mut reply = match delivery {
            Delivery::Stream(on_fragment) => {
                let streamed = self
                    .synthesizer
                    .stream_reply(utterance, mode, cancel, &mut **on_fragment)
                    .await?;
                if streamed.cancelled {
                    return Ok(TurnOutcome::cancelled(TurnPath::Conversational));
                }
                streamed.text
            }
            Delivery::Blocking => self.transport.send_turn(utterance, mode).await?.text,
        };

        self.transition(TurnState::ExtractingImplicit);
        if let Some(followup) = self.synthesizer.implicit_followup(&reply, cancel).await {
            let appended = format!("\n\n{followup}");
            delivery.emit(&appended);
            reply.push_str(&appended);
        }

        self.transition(TurnState::Synthesizing);
        Ok(TurnOutcome {
            reply,
            path: TurnPath::Conversational,
            mode: Some(mode),
            tool_calls: Vec::new(),
            reports: Vec::new(),
            committed: true,
        })
    }

    /// Undo the speculative user turn of a cancelled turn.
    fn abandon(&self, store: &mut ConversationStore, path: TurnPath) -> TurnOutcome {
        store.pop_last_user();
        self.transition(TurnState::Idle);
        info!(path = ?path, "turn cancelled, history unchanged");
        TurnOutcome::cancelled(path)
    }

    fn transition(&self, next: TurnState) {
        let previous = self.state.send_replace(next);
        trace!(from = %previous, to = %next, "turn state");
    }
}

impl fmt::Debug for Conversation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Conversation")
            .field("session_id", &self.session().id)
            .field("state", &self.state())
            .field("resolver", &self.resolver)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
