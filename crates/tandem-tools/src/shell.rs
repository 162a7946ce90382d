//! `run_shell_command` -- run a command through `sh -c` in the working
//! directory.
//!
//! Stdout and stderr are each truncated to [`MAX_OUTPUT_BYTES`] (100 KB).
//! The child is killed if the executor's deadline passes first.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use tandem_agent::{FunctionDeclaration, Tool, ToolOutput};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::{Result, ToolPackError};

/// Maximum output size in bytes (100 KB), applied to stdout and stderr
/// independently.
const MAX_OUTPUT_BYTES: usize = 100 * 1024;

/// Runs shell commands in a fixed working directory.
#[derive(Debug, Clone)]
pub struct RunShellCommand {
    working_dir: PathBuf,
}

impl RunShellCommand {
    pub const NAME: &'static str = "run_shell_command";

    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
        }
    }

    async fn run(&self, args: &Map<String, Value>, deadline: Instant) -> Result<String> {
        let command = args
            .get("command")
            .and_then(Value::as_str)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| ToolPackError::InvalidParams {
                reason: "missing required string field `command`".into(),
            })?;

        let budget = deadline.saturating_duration_since(Instant::now());
        debug!(
            command = command,
            budget_secs = budget.as_secs(),
            working_dir = %self.working_dir.display(),
            "executing shell command"
        );

        let child = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ToolPackError::ExecutionFailed {
                reason: format!("failed to spawn process: {e}"),
            })?;

        // On timeout the future owning the child is dropped, which kills it.
        let output = match tokio::time::timeout_at(deadline, child.wait_with_output()).await {
            Ok(output) => output.map_err(|e| ToolPackError::ExecutionFailed {
                reason: format!("process error: {e}"),
            })?,
            Err(_) => {
                warn!(command = command, "command timed out");
                return Err(ToolPackError::Timeout {
                    seconds: budget.as_secs(),
                });
            }
        };

        let exit_code = output.status.code().unwrap_or(-1);
        let rendered = render_output(&output.stdout, &output.stderr, exit_code);
        debug!(exit_code = exit_code, "command completed");

        if exit_code == 0 {
            Ok(rendered)
        } else {
            Err(ToolPackError::ExecutionFailed { reason: rendered })
        }
    }
}

/// Stdout, then a `[stderr]` section when non-empty, then the exit code.
fn render_output(stdout: &[u8], stderr: &[u8], exit_code: i32) -> String {
    let mut out = String::new();
    let stdout = truncate_output(stdout);
    let stderr = truncate_output(stderr);

    if !stdout.trim().is_empty() {
        out.push_str(stdout.trim_end());
        out.push('\n');
    }
    if !stderr.trim().is_empty() {
        out.push_str("[stderr]\n");
        out.push_str(stderr.trim_end());
        out.push('\n');
    }
    out.push_str(&format!("[exit code: {exit_code}]"));
    out
}

/// Lossy UTF-8 conversion capped at [`MAX_OUTPUT_BYTES`].
fn truncate_output(raw: &[u8]) -> String {
    if raw.len() <= MAX_OUTPUT_BYTES {
        String::from_utf8_lossy(raw).into_owned()
    } else {
        let mut s = String::from_utf8_lossy(&raw[..MAX_OUTPUT_BYTES]).into_owned();
        s.push_str("\n... [output truncated at 100 KB]");
        s
    }
}

#[async_trait]
impl Tool for RunShellCommand {
    fn declaration(&self) -> FunctionDeclaration {
        FunctionDeclaration {
            name: Self::NAME.into(),
            description: "Run a shell command in the working directory and return its output"
                .into(),
            schema: json!({
                "type": "object",
                "properties": {
                    "command": {"type": "string", "description": "The shell command to execute"}
                },
                "required": ["command"]
            }),
        }
    }

    async fn execute(
        &self,
        args: &Map<String, Value>,
        deadline: Instant,
    ) -> tandem_agent::Result<ToolOutput> {
        self.run(args, deadline)
            .await
            .map(ToolOutput::Text)
            .map_err(|e| e.into_agent_error(Self::NAME))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tandem_agent::AgentError;

    use super::*;

    fn command(cmd: &str) -> Map<String, Value> {
        let mut args = Map::new();
        args.insert("command".into(), Value::String(cmd.into()));
        args
    }

    fn soon() -> Instant {
        Instant::now() + Duration::from_secs(10)
    }

    #[tokio::test]
    async fn runs_in_the_working_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "").unwrap();

        let out = RunShellCommand::new(dir.path())
            .execute(&command("ls"), soon())
            .await
            .unwrap()
            .to_text();
        assert_eq!(out, "marker.txt\n[exit code: 0]");
    }

    #[tokio::test]
    async fn non_zero_exit_is_a_failure_with_stderr() {
        let err = RunShellCommand::new("/tmp")
            .execute(&command("echo oops >&2; exit 3"), soon())
            .await
            .unwrap_err();
        match err {
            AgentError::Tool { tool_name, reason } => {
                assert_eq!(tool_name, "run_shell_command");
                assert!(reason.contains("[stderr]\noops"), "{reason}");
                assert!(reason.ends_with("[exit code: 3]"), "{reason}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn deadline_kills_the_command() {
        let err = RunShellCommand::new("/tmp")
            .execute(
                &command("sleep 5"),
                Instant::now() + Duration::from_millis(100),
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("timed out"), "{err}");
    }

    #[tokio::test]
    async fn blank_command_is_rejected() {
        let err = RunShellCommand::new("/tmp")
            .execute(&command("  "), soon())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("invalid parameters"));
    }

    #[test]
    fn large_output_is_truncated() {
        let data = vec![b'x'; MAX_OUTPUT_BYTES + 1000];
        let s = truncate_output(&data);
        assert!(s.ends_with("[output truncated at 100 KB]"));
        assert!(s.len() <= MAX_OUTPUT_BYTES + 50);
    }

    #[test]
    fn empty_streams_render_only_the_exit_code() {
        assert_eq!(render_output(b"", b"", 0), "[exit code: 0]");
    }
}
