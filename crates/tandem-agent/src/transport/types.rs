//! Wire types for the reasoning service.
//!
//! These model the JSON bodies of `/chat` and `/chat/stream` and the small
//! value types (mode, session, fragments) the rest of the pipeline passes
//! around.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AgentError;

// ---------------------------------------------------------------------------
// Mode
// ---------------------------------------------------------------------------

/// How the service should frame its reply.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Plain conversational answer.
    #[default]
    General,
    /// Programming-oriented answer.
    Code,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::General => "general",
            Self::Code => "code",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "general" => Ok(Self::General),
            "code" => Ok(Self::Code),
            other => Err(AgentError::Config {
                reason: format!("unknown mode `{other}` (expected `general` or `code`)"),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// Identity attached to every outbound request.
///
/// Created once per client and never renegotiated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Opaque random token.
    pub id: String,
    /// Mode used when the caller does not pick one.
    pub mode: Mode,
}

impl Session {
    pub fn new(mode: Mode) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            mode,
        }
    }
}

// ---------------------------------------------------------------------------
// Request / response bodies
// ---------------------------------------------------------------------------

/// Body of `POST /chat` and `POST /chat/stream`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequestBody {
    pub message: String,
    pub session_id: String,
    pub mode: Mode,
    pub use_web_search: bool,
    pub fact_check: bool,
}

impl ChatRequestBody {
    pub fn new(message: impl Into<String>, session: &Session, mode: Mode) -> Self {
        Self {
            message: message.into(),
            session_id: session.id.clone(),
            mode,
            use_web_search: false,
            fact_check: false,
        }
    }
}

/// Body returned by `POST /chat`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponseBody {
    pub response: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub usage: Option<Usage>,
}

/// Token accounting reported by the service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

/// The useful part of a `/chat` answer.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatReply {
    pub text: String,
    pub usage: Option<Usage>,
}

impl From<ChatResponseBody> for ChatReply {
    fn from(body: ChatResponseBody) -> Self {
        Self {
            text: body.response,
            usage: body.usage,
        }
    }
}

// ---------------------------------------------------------------------------
// Streaming
// ---------------------------------------------------------------------------

/// Payload of one `data:` line on `/chat/stream`.
#[derive(Debug, Clone, Deserialize)]
pub struct StreamRecord {
    #[serde(default)]
    pub chunk: Option<String>,
    #[serde(default)]
    pub done: bool,
}

/// One incremental piece of streamed text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamFragment {
    pub text: String,
    /// Set on the last fragment when the service marked it as such.
    pub terminal: bool,
}

impl StreamFragment {
    pub fn new(text: impl Into<String>, terminal: bool) -> Self {
        Self {
            text: text.into(),
            terminal,
        }
    }
}
