//! Remote planning through the reasoning service.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{AgentError, Result};
use crate::history::ConversationTurn;
use crate::intent::{Decision, DecisionSource, Planner, PlanningContext};
use crate::tools::{FunctionDeclaration, ToolCall};
use crate::transport::TransportClient;

/// Asks the service for a `{needsTools, toolCalls}` plan.
#[derive(Debug, Clone)]
pub struct RemotePlanner {
    transport: TransportClient,
}

impl RemotePlanner {
    pub fn new(transport: TransportClient) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl Planner for RemotePlanner {
    fn name(&self) -> &'static str {
        "remote"
    }

    async fn plan(&self, ctx: &PlanningContext<'_>) -> Result<Decision> {
        let prompt = build_prompt(ctx);
        debug!(prompt_len = prompt.len(), "requesting remote plan");

        let reply = self.transport.send_turn_precise(&prompt).await?;
        parse_decision(&reply.text)
    }
}

// ---------------------------------------------------------------------------
// Prompt
// ---------------------------------------------------------------------------

fn build_prompt(ctx: &PlanningContext<'_>) -> String {
    let tools = if ctx.declarations.is_empty() {
        "(no tools available)".to_owned()
    } else {
        ctx.declarations
            .iter()
            .map(describe_tool)
            .collect::<Vec<_>>()
            .join("\n")
    };

    let history = if ctx.recent.is_empty() {
        "(none)".to_owned()
    } else {
        ctx.recent
            .iter()
            .map(flatten_turn)
            .collect::<Vec<_>>()
            .join("\n")
    };

    format!(
        r#"You decide whether a user's request must be carried out with tools on their machine, or simply answered.

## Working Directory
{working_dir}

## Available Tools
{tools}

## Recent Conversation
{history}

## Examples
Request: "write a golang hello world server and run it"
{{"needsTools": true, "toolCalls": [{{"name": "write_file", "args": {{"file_path": "server.go", "content": "package main\n..."}}}}, {{"name": "run_shell_command", "args": {{"command": "go run server.go"}}}}]}}

Request: "list the files here"
{{"needsTools": true, "toolCalls": [{{"name": "list_directory", "args": {{"path": "."}}}}]}}

Request: "what is a goroutine?"
{{"needsTools": false, "toolCalls": []}}

## Output Format
Reply with exactly one JSON object and nothing else:
{{"needsTools": <bool>, "toolCalls": [{{"name": "<tool>", "args": {{...}}}}]}}
Use only the tools listed above.  Paths are relative to the working directory.

## Request
{utterance}"#,
        working_dir = ctx.working_dir.display(),
        utterance = ctx.utterance,
    )
}

fn describe_tool(decl: &FunctionDeclaration) -> String {
    format!("- `{}`: {}", decl.signature(), decl.description)
}

fn flatten_turn(turn: &ConversationTurn) -> String {
    format!("{}: {}", turn.role.as_str(), turn.text())
}

// ---------------------------------------------------------------------------
// Reply parsing
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDecision {
    needs_tools: bool,
    #[serde(default)]
    tool_calls: Vec<RawCall>,
}

#[derive(Debug, Deserialize)]
struct RawCall {
    #[serde(default)]
    name: String,
    #[serde(default)]
    args: Value,
}

/// Decode a planner reply into a [`Decision`].
pub fn parse_decision(text: &str) -> Result<Decision> {
    let body = strip_code_fences(text);
    let json = first_json_object(body).ok_or_else(|| AgentError::Planning {
        reason: format!("no JSON object in planner reply: {}", preview(text)),
    })?;

    let raw: RawDecision = serde_json::from_str(json).map_err(|e| AgentError::Planning {
        reason: format!("invalid planner JSON: {e}"),
    })?;

    if !raw.needs_tools {
        return Ok(Decision::conversational(DecisionSource::Remote));
    }

    if raw.tool_calls.is_empty() {
        return Err(AgentError::Planning {
            reason: "needsTools is true but toolCalls is empty".into(),
        });
    }

    let calls = raw
        .tool_calls
        .into_iter()
        .map(|call| {
            if call.name.trim().is_empty() {
                return Err(AgentError::Planning {
                    reason: "tool call without a name".into(),
                });
            }
            let args = match call.args {
                Value::Object(map) => map,
                Value::Null => Map::new(),
                other => {
                    return Err(AgentError::Planning {
                        reason: format!("arguments for '{}' are not an object: {other}", call.name),
                    });
                }
            };
            Ok(ToolCall::new(call.name.trim(), args))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(Decision::with_tools(calls, DecisionSource::Remote))
}

/// Drop a surrounding markdown code fence, if any.
fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(start) = trimmed.find("```") else {
        return trimmed;
    };
    let after = &trimmed[start + 3..];
    // Skip an info string such as `json`.
    let body_start = after.find('\n').map_or(0, |i| i + 1);
    let body = &after[body_start..];
    match body.find("```") {
        Some(end) => body[..end].trim(),
        None => body.trim(),
    }
}

/// First balanced `{...}` substring, honouring string literals and escapes.
fn first_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

fn preview(text: &str) -> String {
    let mut out: String = text.chars().take(120).collect();
    if text.chars().nth(120).is_some() {
        out.push_str("...");
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::path::Path;

    use serde_json::json;

    use super::*;

    #[test]
    fn parses_plain_reply() {
        let d = parse_decision(
            r#"{"needsTools": true, "toolCalls": [{"name": "run_shell_command", "args": {"command": "ls"}}]}"#,
        )
        .unwrap();
        assert!(d.needs_tools);
        assert_eq!(d.source, DecisionSource::Remote);
        assert_eq!(d.tool_calls[0].arg_str("command"), Some("ls"));
    }

    #[test]
    fn parses_fenced_reply_with_chatter() {
        let text = "Sure!\n```json\n{\"needsTools\": false, \"toolCalls\": []}\n```\nHope that helps.";
        let d = parse_decision(text).unwrap();
        assert!(!d.needs_tools);
    }

    #[test]
    fn braces_inside_strings_do_not_end_the_object() {
        let text = r#"Plan: {"needsTools": true, "toolCalls": [{"name": "write_file", "args": {"file_path": "a.go", "content": "func main() { fmt.Println(\"}\") }"}}]} trailing {junk}"#;
        let d = parse_decision(text).unwrap();
        assert_eq!(
            d.tool_calls[0].arg_str("content"),
            Some(r#"func main() { fmt.Println("}") }"#)
        );
    }

    #[test]
    fn needs_tools_without_calls_is_an_error() {
        let err = parse_decision(r#"{"needsTools": true, "toolCalls": []}"#).unwrap_err();
        assert!(matches!(err, AgentError::Planning { .. }));
    }

    #[test]
    fn nameless_call_is_an_error() {
        let err =
            parse_decision(r#"{"needsTools": true, "toolCalls": [{"name": " ", "args": {}}]}"#)
                .unwrap_err();
        assert!(matches!(err, AgentError::Planning { .. }));
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(parse_decision("I think you should write a file.").is_err());
        assert!(parse_decision("{ not json }").is_err());
        assert!(parse_decision("{\"needsTools\": true").is_err());
    }

    #[test]
    fn prompt_lists_tools_history_and_directory() {
        let decls = vec![FunctionDeclaration {
            name: "write_file".into(),
            description: "Write a file".into(),
            schema: json!({
                "type": "object",
                "properties": {"file_path": {}, "content": {}},
                "required": ["file_path", "content"]
            }),
        }];
        let recent = vec![
            ConversationTurn::user("earlier question"),
            ConversationTurn::model("earlier answer"),
        ];
        let prompt = build_prompt(&PlanningContext {
            utterance: "make a server",
            recent: &recent,
            working_dir: Path::new("/work/dir"),
            declarations: &decls,
        });

        assert!(prompt.contains("/work/dir"));
        assert!(prompt.contains("`write_file(content, file_path)`: Write a file"));
        assert!(prompt.contains("user: earlier question"));
        assert!(prompt.contains("model: earlier answer"));
        assert!(prompt.ends_with("make a server"));
        assert!(prompt.contains("\"needsTools\""));
    }
}
