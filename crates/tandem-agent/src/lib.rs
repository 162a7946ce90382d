//! Turn orchestration for Tandem.
//!
//! This crate drives a conversation with a remote reasoning service: it
//! keeps the turn history, decides per utterance whether local tools are
//! needed, runs them, and produces the model turn that gets committed.
//!
//! ## Architecture
//!
//! ```text
//!                    ┌────────────────┐
//!  utterance ──────> │  Conversation  │ ── single turn at a time
//!                    └───────┬────────┘
//!            ┌───────────────┼──────────────────┐
//!            v               v                  v
//!   ┌────────────────┐ ┌────────────┐ ┌────────────────────┐
//!   │ IntentResolver │ │ToolExecutor│ │ ResponseSynthesizer│
//!   │ remote→heur.   │ │ sequential │ │ ack / stream reply │
//!   └───────┬────────┘ └─────┬──────┘ └─────────┬──────────┘
//!           │                │                  │
//!           v                v                  v
//!   ┌────────────────┐ ┌────────────┐   ┌────────────────┐
//!   │TransportClient │ │ToolRegistry│   │ConversationStore│
//!   │ retry + stream │ │  (trait)   │   │ curated history │
//!   └────────────────┘ └────────────┘   └────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`conversation`] -- The turn state machine and its public entry points.
//! - [`transport`] -- HTTP client for `/chat`, `/chat/stream` and friends.
//! - [`history`] -- Turn types, the store, and curation.
//! - [`intent`] -- Remote and heuristic planners, mode selection.
//! - [`executor`] -- Sequential tool execution and report aggregation.
//! - [`synthesizer`] -- Acknowledgments, streamed replies, implicit actions.
//! - [`tools`] -- The tool and registry traits.
//! - [`seed`] -- Environment context that opens every history.
//! - [`config`] -- [`ClientConfig`] and its loading rules.
//! - [`error`] -- Error types.

pub mod config;
pub mod conversation;
pub mod error;
pub mod executor;
pub mod history;
pub mod intent;
pub mod seed;
pub mod synthesizer;
pub mod tools;
pub mod transport;

// Re-export the most commonly used types at the crate root.
pub use config::ClientConfig;
pub use conversation::{Conversation, TurnOutcome, TurnPath, TurnState};
pub use error::{AgentError, Result};
pub use executor::{ExecutionOutcome, ToolExecutionReport, ToolExecutor};
pub use history::{ConversationStore, ConversationTurn, Part, RawTurn, Role, curate_turns};
pub use intent::{
    Decision, DecisionSource, HeuristicPlanner, IntentResolver, ModeSelector, Planner,
    PlanningContext, RemotePlanner,
};
pub use synthesizer::{ResponseSynthesizer, acknowledge, extract_implicit_actions};
pub use tools::{
    FunctionDeclaration, MapRegistry, Tool, ToolCall, ToolOutput, ToolRegistry, validate_args,
};
pub use transport::{Mode, Session, StreamFragment, TransportClient};
