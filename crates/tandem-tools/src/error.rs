//! Tool pack error types.

use tandem_agent::AgentError;

/// Errors raised inside the reference tools.
#[derive(Debug, thiserror::Error)]
pub enum ToolPackError {
    /// An I/O operation failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The arguments did not make sense for the tool.
    #[error("invalid parameters: {reason}")]
    InvalidParams { reason: String },

    /// A path resolved outside the working directory.
    #[error("path `{path}` is outside the working directory `{root}`")]
    OutsideRoot { path: String, root: String },

    /// The operation ran but did not succeed.
    #[error("execution failed: {reason}")]
    ExecutionFailed { reason: String },

    /// The operation hit its deadline.
    #[error("timed out after {seconds}s")]
    Timeout { seconds: u64 },
}

/// Convenience alias used throughout the tools crate.
pub type Result<T> = std::result::Result<T, ToolPackError>;

impl ToolPackError {
    /// Attach the tool name and convert into the pipeline's error type.
    pub fn into_agent_error(self, tool_name: &str) -> AgentError {
        AgentError::Tool {
            tool_name: tool_name.to_owned(),
            reason: self.to_string(),
        }
    }
}
