//! Agent error types.
//!
//! Every subsystem of the turn pipeline surfaces errors through
//! [`AgentError`].  Only some variants ever reach the end user: planning
//! failures are absorbed by the heuristic stage, tool failures become inline
//! report lines, and malformed stream lines are skipped.

/// Unified error type for the turn pipeline.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    // -- Transport errors ----------------------------------------------------
    /// A single HTTP attempt against the reasoning service failed.
    ///
    /// `status` is `None` for connection-level failures (refused, reset,
    /// timed out).  The retry layer decides from it whether to try again.
    #[error("request failed{}: {reason}", .status.map(|s| format!(" ({s})")).unwrap_or_default())]
    Request { status: Option<u16>, reason: String },

    /// The request could not be completed within the retry budget.
    #[error("transport error after {attempts} attempt(s): {reason}")]
    Transport { attempts: u32, reason: String },

    /// The service answered, but the body did not match the wire contract.
    #[error("protocol error: {reason}")]
    Protocol { reason: String },

    // -- Pipeline errors -----------------------------------------------------
    /// The remote planner was unreachable or its answer was unusable.
    #[error("planning failed: {reason}")]
    Planning { reason: String },

    /// A tool invocation failed.
    #[error("tool `{tool_name}` failed: {reason}")]
    Tool { tool_name: String, reason: String },

    /// An attempt to install history containing a role other than
    /// `user` or `model`.
    #[error("history rejected: unsupported role `{role}`")]
    HistoryInvariant { role: String },

    /// The turn was cancelled before it could finish.
    #[error("turn cancelled")]
    Cancelled,

    // -- Configuration -------------------------------------------------------
    /// Configuration validation or loading failed.
    #[error("config error: {reason}")]
    Config { reason: String },

    // -- Serialization -------------------------------------------------------
    /// JSON serialization or deserialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience alias used throughout the agent crate.
pub type Result<T> = std::result::Result<T, AgentError>;

impl AgentError {
    /// Whether retrying the same request may succeed.
    ///
    /// Connection failures, timeouts, `429` and `5xx` answers are transient;
    /// everything else fails fast.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Request { status: None, .. } => true,
            Self::Request {
                status: Some(code), ..
            } => *code == 429 || (500..600).contains(code),
            _ => false,
        }
    }
}

impl From<reqwest::Error> for AgentError {
    fn from(err: reqwest::Error) -> Self {
        Self::Request {
            status: err.status().map(|s| s.as_u16()),
            reason: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_failures_are_transient() {
        let err = AgentError::Request {
            status: None,
            reason: "connection refused".into(),
        };
        assert!(err.is_transient());
    }

    #[test]
    fn throttling_and_server_errors_are_transient() {
        for code in [429, 500, 502, 503] {
            let err = AgentError::Request {
                status: Some(code),
                reason: String::new(),
            };
            assert!(err.is_transient(), "{code} should be retried");
        }
    }

    #[test]
    fn client_errors_fail_fast() {
        for code in [400, 401, 404, 422] {
            let err = AgentError::Request {
                status: Some(code),
                reason: String::new(),
            };
            assert!(!err.is_transient(), "{code} should not be retried");
        }
        assert!(!AgentError::Protocol { reason: "x".into() }.is_transient());
    }

    #[test]
    fn request_display_includes_status() {
        let err = AgentError::Request {
            status: Some(503),
            reason: "unavailable".into(),
        };
        assert_eq!(err.to_string(), "request failed (503): unavailable");

        let err = AgentError::Request {
            status: None,
            reason: "refused".into(),
        };
        assert_eq!(err.to_string(), "request failed: refused");
    }
}
