//! Tool executor.
//!
//! Runs a tool-call plan strictly in order against a [`ToolRegistry`].  A
//! failing call never aborts the plan: every entry produces exactly one
//! [`ToolExecutionReport`], and the reports are folded into one text block
//! for the model turn.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use crate::error::AgentError;
use crate::tools::{ToolCall, ToolRegistry, validate_args};

/// Text reported for a tool that produced nothing.
pub const NO_OUTPUT: &str = "(no output)";

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// Result of one tool call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolExecutionReport {
    pub tool_name: String,
    pub output_text: String,
    pub succeeded: bool,
}

impl ToolExecutionReport {
    fn ok(tool_name: &str, output_text: String) -> Self {
        Self {
            tool_name: tool_name.to_owned(),
            output_text,
            succeeded: true,
        }
    }

    fn error(tool_name: &str, output_text: String) -> Self {
        Self {
            tool_name: tool_name.to_owned(),
            output_text,
            succeeded: false,
        }
    }

    /// `[<name>] <text>` or `[<name>] Error: <text>`.
    pub fn render(&self) -> String {
        if self.succeeded {
            format!("[{}] {}", self.tool_name, self.output_text)
        } else {
            format!("[{}] Error: {}", self.tool_name, self.output_text)
        }
    }
}

/// All reports of one plan run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionOutcome {
    pub reports: Vec<ToolExecutionReport>,
    /// Set when the run stopped early because the turn was cancelled.
    pub cancelled: bool,
}

impl ExecutionOutcome {
    /// Sections joined by a blank line, in plan order.
    pub fn aggregate(&self) -> String {
        self.reports
            .iter()
            .map(ToolExecutionReport::render)
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    pub fn all_succeeded(&self) -> bool {
        self.reports.iter().all(|r| r.succeeded)
    }
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

/// Sequential tool runner.
#[derive(Clone)]
pub struct ToolExecutor {
    registry: Option<Arc<dyn ToolRegistry>>,
    timeout: Duration,
}

impl ToolExecutor {
    pub fn new(registry: Option<Arc<dyn ToolRegistry>>, timeout: Duration) -> Self {
        Self { registry, timeout }
    }

    pub fn registry(&self) -> Option<&Arc<dyn ToolRegistry>> {
        self.registry.as_ref()
    }

    /// Run every call in order.
    ///
    /// `cancel` is checked between calls.  A call already running is left
    /// to finish (bounded by the per-call timeout) and its report kept, so
    /// the outcome describes every call that started.
    pub async fn execute_plan(
        &self,
        plan: &[ToolCall],
        cancel: &CancellationToken,
    ) -> ExecutionOutcome {
        let mut outcome = ExecutionOutcome::default();

        for (index, call) in plan.iter().enumerate() {
            if cancel.is_cancelled() {
                tracing::info!(completed = index, total = plan.len(), "tool plan cancelled");
                outcome.cancelled = true;
                break;
            }

            tracing::info!(tool = %call.name, step = index + 1, total = plan.len(), "executing tool call");
            let report = self.execute_call(call).await;

            if report.succeeded {
                tracing::debug!(tool = %call.name, output_len = report.output_text.len(), "tool call succeeded");
            } else {
                tracing::warn!(tool = %call.name, error = %report.output_text, "tool call failed");
            }
            outcome.reports.push(report);
        }

        outcome
    }

    /// Run one call and turn every failure mode into a report.
    async fn execute_call(&self, call: &ToolCall) -> ToolExecutionReport {
        let name = call.name.trim();
        if name.is_empty() {
            return ToolExecutionReport::error("unknown", "Tool call is missing a name".into());
        }

        let Some(registry) = &self.registry else {
            return ToolExecutionReport::error(
                name,
                format!("Tool registry unavailable; cannot run '{name}'"),
            );
        };

        let Some(tool) = registry.get_tool(name) else {
            return ToolExecutionReport::error(name, format!("Tool '{name}' not found"));
        };

        let declaration = tool.declaration();
        let args: &Map<String, Value> = &call.args;
        if let Err(reason) = validate_args(&declaration, args) {
            return ToolExecutionReport::error(
                name,
                format!("Invalid arguments for '{name}': {reason}"),
            );
        }

        let deadline = tokio::time::Instant::now() + self.timeout;
        match tokio::time::timeout_at(deadline, tool.execute(args, deadline)).await {
            Ok(Ok(output)) => {
                let text = output.to_text();
                if text.trim().is_empty() {
                    ToolExecutionReport::ok(name, NO_OUTPUT.into())
                } else {
                    ToolExecutionReport::ok(name, text)
                }
            }
            Ok(Err(e)) => ToolExecutionReport::error(name, error_text(e)),
            Err(_) => ToolExecutionReport::error(
                name,
                format!("Tool '{name}' timed out after {}s", self.timeout.as_secs()),
            ),
        }
    }
}

impl std::fmt::Debug for ToolExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolExecutor")
            .field("has_registry", &self.registry.is_some())
            .field("timeout", &self.timeout)
            .finish()
    }
}

fn error_text(err: AgentError) -> String {
    match err {
        AgentError::Tool { reason, .. } => reason,
        other => other.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::error::Result;
    use crate::history::Part;
    use crate::tools::{FunctionDeclaration, MapRegistry, Tool, ToolOutput};

    /// Echoes its `text` argument and records the order of calls.
    struct Echo {
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Tool for Echo {
        fn declaration(&self) -> FunctionDeclaration {
            FunctionDeclaration {
                name: "echo".into(),
                description: "Echo text".into(),
                schema: json!({
                    "type": "object",
                    "properties": {"text": {"type": "string"}},
                    "required": ["text"]
                }),
            }
        }

        async fn execute(
            &self,
            args: &Map<String, Value>,
            _deadline: tokio::time::Instant,
        ) -> Result<ToolOutput> {
            let text = args["text"].as_str().unwrap_or_default().to_owned();
            self.log.lock().unwrap().push(text.clone());
            Ok(ToolOutput::Parts(vec![Part::Text(text)]))
        }
    }

    struct Failing;

    #[async_trait]
    impl Tool for Failing {
        fn declaration(&self) -> FunctionDeclaration {
            FunctionDeclaration {
                name: "fail".into(),
                description: "Always fails".into(),
                schema: json!({"type": "object"}),
            }
        }

        async fn execute(
            &self,
            _args: &Map<String, Value>,
            _deadline: tokio::time::Instant,
        ) -> Result<ToolOutput> {
            Err(AgentError::Tool {
                tool_name: "fail".into(),
                reason: "disk on fire".into(),
            })
        }
    }

    struct Slow;

    #[async_trait]
    impl Tool for Slow {
        fn declaration(&self) -> FunctionDeclaration {
            FunctionDeclaration {
                name: "slow".into(),
                description: "Sleeps".into(),
                schema: json!({"type": "object"}),
            }
        }

        async fn execute(
            &self,
            _args: &Map<String, Value>,
            _deadline: tokio::time::Instant,
        ) -> Result<ToolOutput> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(ToolOutput::Text("late".into()))
        }
    }

    fn echo_call(text: &str) -> ToolCall {
        let mut args = Map::new();
        args.insert("text".into(), json!(text));
        ToolCall::new("echo", args)
    }

    fn executor(log: Arc<Mutex<Vec<String>>>) -> ToolExecutor {
        let registry = MapRegistry::new()
            .with(Arc::new(Echo { log }))
            .with(Arc::new(Failing))
            .with(Arc::new(Slow));
        ToolExecutor::new(Some(Arc::new(registry)), Duration::from_secs(1))
    }

    #[tokio::test]
    async fn reports_one_section_per_call_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let exec = executor(log.clone());
        let plan = vec![
            echo_call("one"),
            ToolCall::new("missing", Map::new()),
            ToolCall::new("fail", Map::new()),
            echo_call(""),
            echo_call("two"),
        ];

        let outcome = exec.execute_plan(&plan, &CancellationToken::new()).await;

        assert_eq!(outcome.reports.len(), plan.len());
        assert!(!outcome.cancelled);
        assert_eq!(*log.lock().unwrap(), vec!["one", "", "two"]);
        assert_eq!(
            outcome.aggregate(),
            "[echo] one\n\n\
             [missing] Error: Tool 'missing' not found\n\n\
             [fail] Error: disk on fire\n\n\
             [echo] (no output)\n\n\
             [echo] two"
        );
    }

    #[tokio::test]
    async fn invalid_arguments_are_rejected_before_the_tool_runs() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let outcome = executor(log.clone())
            .execute_plan(&[ToolCall::new("echo", Map::new())], &CancellationToken::new())
            .await;

        assert!(log.lock().unwrap().is_empty());
        assert!(!outcome.reports[0].succeeded);
        assert!(
            outcome.reports[0]
                .output_text
                .starts_with("Invalid arguments for 'echo':")
        );
    }

    #[tokio::test]
    async fn mistyped_arguments_are_reported_without_running() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let exec = executor(log.clone());
        let mut args = Map::new();
        args.insert("text".into(), json!(42));

        let outcome = exec
            .execute_plan(&[ToolCall::new("echo", args)], &CancellationToken::new())
            .await;

        assert!(!outcome.reports[0].succeeded);
        assert_eq!(
            outcome.reports[0].output_text,
            "Invalid arguments for 'echo': /text: 42 is not of type \"string\""
        );
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_registry_degrades_per_call() {
        let exec = ToolExecutor::new(None, Duration::from_secs(1));
        let outcome = exec
            .execute_plan(&[echo_call("a"), echo_call("b")], &CancellationToken::new())
            .await;

        assert_eq!(outcome.reports.len(), 2);
        assert_eq!(
            outcome.reports[1].render(),
            "[echo] Error: Tool registry unavailable; cannot run 'echo'"
        );
    }

    #[tokio::test]
    async fn nameless_call_is_reported() {
        let exec = ToolExecutor::new(None, Duration::from_secs(1));
        let outcome = exec
            .execute_plan(&[ToolCall::new("", Map::new())], &CancellationToken::new())
            .await;
        assert_eq!(outcome.reports[0].output_text, "Tool call is missing a name");
    }

    #[tokio::test]
    async fn slow_tools_time_out() {
        let exec = executor(Arc::new(Mutex::new(Vec::new())));
        let outcome = exec
            .execute_plan(
                &[ToolCall::new("slow", Map::new()), echo_call("after")],
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(
            outcome.reports[0].output_text,
            "Tool 'slow' timed out after 1s"
        );
        assert!(outcome.reports[1].succeeded);
    }

    #[tokio::test]
    async fn cancellation_before_start_runs_nothing() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = executor(log.clone())
            .execute_plan(&[echo_call("a")], &cancel)
            .await;

        assert!(outcome.cancelled);
        assert!(outcome.reports.is_empty());
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn cancellation_mid_plan_keeps_completed_reports() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let exec = executor(log.clone());
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let outcome = exec
            .execute_plan(
                &[echo_call("first"), ToolCall::new("slow", Map::new()), echo_call("never")],
                &cancel,
            )
            .await;

        assert!(outcome.cancelled);
        assert_eq!(outcome.reports.len(), 2);
        assert_eq!(outcome.reports[0].output_text, "first");
        assert_eq!(
            outcome.reports[1].output_text,
            "Tool 'slow' timed out after 1s"
        );
        assert_eq!(*log.lock().unwrap(), vec!["first"]);
    }
}
