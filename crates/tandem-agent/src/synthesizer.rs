//! Reply synthesis.
//!
//! Builds the model-turn text for both turn paths:
//!
//! - tool path: a short acknowledgment of what was done followed by the
//!   executor's aggregate report;
//! - conversational path: the streamed reply, optionally followed by the
//!   report of implicit file writes for code blocks found in it.

use std::collections::HashSet;
use std::sync::OnceLock;

use futures::StreamExt;
use regex::Regex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::Result;
use crate::executor::{ExecutionOutcome, ToolExecutor};
use crate::tools::{RUN_SHELL_COMMAND, ToolCall, WRITE_FILE};
use crate::transport::{Mode, TransportClient};

// ---------------------------------------------------------------------------
// Acknowledgments
// ---------------------------------------------------------------------------

/// One-line summary of a plan: `Created 'a'`, `Executed 'cmd'`,
/// `Created 'a' and executed 'cmd'`, or `Ran <n> tool call(s)`.
pub fn acknowledge(plan: &[ToolCall]) -> String {
    let created: Vec<String> = plan
        .iter()
        .filter(|c| c.name == WRITE_FILE)
        .filter_map(|c| c.target_path())
        .map(|p| format!("'{p}'"))
        .collect();
    let executed: Vec<String> = plan
        .iter()
        .filter(|c| c.name == RUN_SHELL_COMMAND)
        .filter_map(|c| c.arg_str("command"))
        .map(|cmd| format!("'{cmd}'"))
        .collect();

    match (created.is_empty(), executed.is_empty()) {
        (false, true) => format!("Created {}", created.join(", ")),
        (true, false) => format!("Executed {}", executed.join(", ")),
        (false, false) => format!(
            "Created {} and executed {}",
            created.join(", "),
            executed.join(", ")
        ),
        (true, true) => format!("Ran {} tool call(s)", plan.len()),
    }
}

/// Acknowledgment, a blank line, then the raw aggregate report.
pub fn compose_tool_reply(plan: &[ToolCall], aggregate: &str) -> String {
    format!("{}.\n\n{}", acknowledge(plan), aggregate)
}

// ---------------------------------------------------------------------------
// Implicit actions
// ---------------------------------------------------------------------------

fn fence_regex() -> &'static Regex {
    static CACHED: OnceLock<Regex> = OnceLock::new();
    CACHED.get_or_init(|| {
        Regex::new(r"(?s)```([A-Za-z0-9_+#.-]*)[^\n]*\n(.*?)```")
            .expect("fence regex must compile")
    })
}

fn save_hint_regex() -> &'static Regex {
    static CACHED: OnceLock<Regex> = OnceLock::new();
    CACHED.get_or_init(|| {
        Regex::new(r"(?i)save (?:it|this) (?:to|as) `?([A-Za-z0-9_./-]+\.[A-Za-z0-9]+)`?")
            .expect("save hint regex must compile")
    })
}

fn backtick_file_regex() -> &'static Regex {
    static CACHED: OnceLock<Regex> = OnceLock::new();
    CACHED.get_or_init(|| {
        Regex::new(r"`([A-Za-z0-9_./-]*[A-Za-z0-9_-]\.[A-Za-z0-9]{1,8})`")
            .expect("backtick file regex must compile")
    })
}

fn first_line_hint_regex() -> &'static Regex {
    static CACHED: OnceLock<Regex> = OnceLock::new();
    CACHED.get_or_init(|| {
        Regex::new(r"^\s*(?:(?://|#|--)\s*)?(?i:filename:\s*)?([A-Za-z0-9_./-]+\.[A-Za-z0-9]{1,8})\s*$")
            .expect("first line hint regex must compile")
    })
}

/// Default file name for a code block's language tag.
fn default_filename(language: &str) -> Option<&'static str> {
    let name = match language.to_ascii_lowercase().as_str() {
        "go" | "golang" => "main.go",
        "python" | "py" | "python3" => "main.py",
        "javascript" | "js" | "node" => "index.js",
        "typescript" | "ts" => "index.ts",
        "rust" | "rs" => "main.rs",
        "html" => "index.html",
        "css" => "styles.css",
        "bash" | "sh" | "shell" | "zsh" => "script.sh",
        "c" => "main.c",
        "cpp" | "c++" => "main.cpp",
        "java" => "Main.java",
        "ruby" | "rb" => "main.rb",
        _ => return None,
    };
    Some(name)
}

/// Build a `write_file` plan for the fenced code blocks in `text`.
///
/// The file name for a block comes from, in order: a "save it to X" /
/// "save this as X" phrase or a backticked file name in the prose just
/// before the block; a `filename: X` or `// X` first code line; the
/// language default.  Blocks with none of these, or naming a file already
/// claimed by an earlier block, are skipped.
pub fn extract_implicit_actions(text: &str) -> Vec<ToolCall> {
    let mut calls = Vec::new();
    let mut seen = HashSet::new();
    let mut prose_start = 0;

    for caps in fence_regex().captures_iter(text) {
        let (Some(whole), Some(body)) = (caps.get(0), caps.get(2)) else {
            continue;
        };
        let language = caps.get(1).map_or("", |m| m.as_str());
        let prose = &text[prose_start..whole.start()];
        prose_start = whole.end();

        let mut content = body.as_str().to_owned();
        let name = match hint_from_prose(prose) {
            Some(name) => Some(name),
            None => match hint_from_first_line(&content) {
                Some((name, rest)) => {
                    content = rest;
                    Some(name)
                }
                None => default_filename(language).map(str::to_owned),
            },
        };

        let Some(name) = name else {
            debug!(language, "code block without a usable file name");
            continue;
        };
        if content.trim().is_empty() || !seen.insert(name.clone()) {
            continue;
        }
        calls.push(ToolCall::write_file(name, content));
    }

    calls
}

fn hint_from_prose(prose: &str) -> Option<String> {
    if let Some(caps) = save_hint_regex().captures_iter(prose).last() {
        return caps.get(1).map(|m| m.as_str().to_owned());
    }
    backtick_file_regex()
        .captures_iter(prose)
        .last()
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_owned())
}

/// A file-name comment on the first code line.  Returns the name and the
/// content with that line removed.
fn hint_from_first_line(content: &str) -> Option<(String, String)> {
    let (first, rest) = content.split_once('\n').unwrap_or((content, ""));
    let trimmed = first.trim();
    let is_comment = trimmed.starts_with("//")
        || trimmed.starts_with('#')
        || trimmed.starts_with("--")
        || trimmed.to_ascii_lowercase().starts_with("filename:");
    if !is_comment {
        return None;
    }
    let caps = first_line_hint_regex().captures(first)?;
    let name = caps.get(1)?.as_str().to_owned();
    Some((name, rest.to_owned()))
}

// ---------------------------------------------------------------------------
// Synthesizer
// ---------------------------------------------------------------------------

/// A finished conversational stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamedReply {
    pub text: String,
    pub fragments: usize,
    /// The stream was cut short by cancellation.
    pub cancelled: bool,
}

/// Produces model-turn text for both turn paths.
#[derive(Debug, Clone)]
pub struct ResponseSynthesizer {
    transport: TransportClient,
    executor: ToolExecutor,
    implicit_actions: bool,
}

impl ResponseSynthesizer {
    pub fn new(transport: TransportClient, executor: ToolExecutor, implicit_actions: bool) -> Self {
        Self {
            transport,
            executor,
            implicit_actions,
        }
    }

    /// Run a tool plan and compose the reply from its outcome.
    pub async fn tool_reply(
        &self,
        plan: &[ToolCall],
        cancel: &CancellationToken,
    ) -> (String, ExecutionOutcome) {
        let outcome = self.executor.execute_plan(plan, cancel).await;
        let ran = &plan[..outcome.reports.len().min(plan.len())];
        let reply = compose_tool_reply(ran, &outcome.aggregate());
        (reply, outcome)
    }

    /// Stream a conversational reply, handing each fragment to `on_fragment`
    /// as it arrives.
    pub async fn stream_reply(
        &self,
        utterance: &str,
        mode: Mode,
        cancel: &CancellationToken,
        on_fragment: &mut (dyn FnMut(&str) + Send),
    ) -> Result<StreamedReply> {
        let mut stream = self.transport.stream_turn(utterance, mode, cancel.clone());
        let mut reply = StreamedReply::default();

        while let Some(item) = stream.next().await {
            let fragment = item?;
            on_fragment(&fragment.text);
            reply.text.push_str(&fragment.text);
            reply.fragments += 1;
            if fragment.terminal {
                break;
            }
        }

        reply.cancelled = cancel.is_cancelled();
        debug!(
            fragments = reply.fragments,
            chars = reply.text.len(),
            cancelled = reply.cancelled,
            "stream finished"
        );
        Ok(reply)
    }

    /// Run implicit file writes for the code blocks in `text`.  Returns the
    /// text to append to the reply, if anything ran.
    pub async fn implicit_followup(&self, text: &str, cancel: &CancellationToken) -> Option<String> {
        if !self.implicit_actions {
            return None;
        }
        let plan = extract_implicit_actions(text);
        if plan.is_empty() {
            return None;
        }

        info!(calls = plan.len(), "running implicit actions");
        let (reply, outcome) = self.tool_reply(&plan, cancel).await;
        if outcome.reports.is_empty() {
            return None;
        }
        Some(reply)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
