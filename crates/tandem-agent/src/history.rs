//! Conversation history.
//!
//! [`ConversationStore`] is the single owner of the turn sequence.  Outside
//! code appends turns and reads copies; the curated projection used for
//! context building is recomputed from scratch on every call so it can never
//! drift from the raw history.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AgentError, Result};

// ---------------------------------------------------------------------------
// Turn types
// ---------------------------------------------------------------------------

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Model => "model",
        }
    }

    /// Parse a wire-level role, rejecting anything but `user` and `model`.
    pub fn parse(role: &str) -> Result<Self> {
        match role {
            "user" => Ok(Self::User),
            "model" => Ok(Self::Model),
            other => Err(AgentError::HistoryInvariant {
                role: other.to_owned(),
            }),
        }
    }
}

/// One piece of turn content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Part {
    Text(String),
    Structured(Value),
}

impl Part {
    fn is_valid(&self) -> bool {
        match self {
            Self::Text(text) => !text.is_empty(),
            Self::Structured(Value::Object(map)) => !map.is_empty(),
            Self::Structured(_) => true,
        }
    }
}

/// A single user or model turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub parts: Vec<Part>,
}

impl ConversationTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            parts: vec![Part::Text(text.into())],
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            parts: vec![Part::Text(text.into())],
        }
    }

    /// At least one part, no empty text part, no empty structured object.
    pub fn is_valid(&self) -> bool {
        !self.parts.is_empty() && self.parts.iter().all(Part::is_valid)
    }

    /// Concatenated text parts, separated by newlines.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                Part::Text(t) => Some(t.as_str()),
                Part::Structured(_) => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// A turn as it arrives from outside (e.g. a restored session file), with
/// its role still unchecked.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawTurn {
    pub role: String,
    pub parts: Vec<Part>,
}

impl TryFrom<RawTurn> for ConversationTurn {
    type Error = AgentError;

    fn try_from(raw: RawTurn) -> Result<Self> {
        Ok(Self {
            role: Role::parse(&raw.role)?,
            parts: raw.parts,
        })
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Ordered turn history with a curated, role-alternating projection.
#[derive(Debug, Default)]
pub struct ConversationStore {
    turns: Vec<ConversationTurn>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, turn: ConversationTurn) {
        self.turns.push(turn);
    }

    /// Deep copy of the full history.
    pub fn snapshot(&self) -> Vec<ConversationTurn> {
        self.turns.clone()
    }

    /// Deep copy of the curated projection.
    pub fn curate(&self) -> Vec<ConversationTurn> {
        curate_turns(&self.turns)
    }

    /// The last `k` curated turns.
    pub fn recent_curated(&self, k: usize) -> Vec<ConversationTurn> {
        let mut curated = self.curate();
        let skip = curated.len().saturating_sub(k);
        curated.drain(..skip);
        curated
    }

    /// Remove the trailing turn if it is a user turn.
    ///
    /// Used to roll back the speculative user turn of a failed exchange.
    pub fn pop_last_user(&mut self) -> Option<ConversationTurn> {
        match self.turns.last() {
            Some(turn) if turn.role == Role::User => self.turns.pop(),
            _ => None,
        }
    }

    /// Replace the whole history.  Nothing changes if any role is invalid.
    pub fn set_history(&mut self, turns: Vec<RawTurn>) -> Result<()> {
        let validated = turns
            .into_iter()
            .map(ConversationTurn::try_from)
            .collect::<Result<Vec<_>>>()?;
        self.turns = validated;
        Ok(())
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Curation
// ---------------------------------------------------------------------------

/// Compute the curated projection of a history.
///
/// Single left-to-right pass.  User turns are kept when valid; consecutive
/// user turns merge into one.  Each maximal run of model turns is kept only
/// if every turn in it is valid, in which case it is merged into a single
/// model turn; an invalid run is dropped together with the user turn it
/// answered.  A model run with no user turn before it is dropped.
///
/// The result alternates user/model starting with user (or is empty), and
/// curating it again returns it unchanged.
pub fn curate_turns(turns: &[ConversationTurn]) -> Vec<ConversationTurn> {
    let mut curated: Vec<ConversationTurn> = Vec::with_capacity(turns.len());
    let mut i = 0;

    while i < turns.len() {
        if turns[i].role == Role::User {
            if turns[i].is_valid() {
                push_user(&mut curated, &turns[i]);
            }
            i += 1;
            continue;
        }

        let start = i;
        while i < turns.len() && turns[i].role == Role::Model {
            i += 1;
        }
        let run = &turns[start..i];
        let follows_user = matches!(curated.last(), Some(t) if t.role == Role::User);

        if run.iter().all(ConversationTurn::is_valid) {
            if follows_user {
                curated.push(merge_run(run));
            }
        } else if follows_user {
            curated.pop();
        }
    }

    curated
}

fn push_user(curated: &mut Vec<ConversationTurn>, turn: &ConversationTurn) {
    match curated.last_mut() {
        Some(last) if last.role == Role::User => last.parts.extend(turn.parts.iter().cloned()),
        _ => curated.push(turn.clone()),
    }
}

fn merge_run(run: &[ConversationTurn]) -> ConversationTurn {
    ConversationTurn {
        role: Role::Model,
        parts: run.iter().flat_map(|t| t.parts.iter().cloned()).collect(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
