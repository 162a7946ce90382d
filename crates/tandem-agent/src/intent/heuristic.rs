//! Keyword heuristics used when remote planning is unavailable.

use async_trait::async_trait;

use crate::error::Result;
use crate::history::{ConversationTurn, Role};
use crate::intent::{Decision, DecisionSource, Planner, PlanningContext};
use crate::tools::ToolCall;

const WRITE_WORDS: &[&str] = &["write", "create", "make", "generate", "build"];
const SERVER_WORDS: &[&str] = &["server", "hello"];
const RUN_WORDS: &[&str] = &["run", "execute", "exec", "start", "launch"];

// ---------------------------------------------------------------------------
// Languages
// ---------------------------------------------------------------------------

/// Languages the heuristics know how to scaffold and run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    Go,
    Python,
    Node,
}

impl Language {
    /// Infer from lower-cased utterance words.  Node is the default.
    fn from_words(words: &[&str]) -> Self {
        if words.iter().any(|w| matches!(*w, "golang" | "go")) {
            Self::Go
        } else if words.iter().any(|w| matches!(*w, "python" | "python3" | "py")) {
            Self::Python
        } else {
            Self::Node
        }
    }

    /// Infer from a file name's extension.
    pub fn from_filename(name: &str) -> Option<Self> {
        let ext = name.rsplit_once('.')?.1;
        match ext.to_ascii_lowercase().as_str() {
            "go" => Some(Self::Go),
            "py" => Some(Self::Python),
            "js" | "mjs" | "cjs" => Some(Self::Node),
            _ => None,
        }
    }

    pub fn server_filename(self) -> &'static str {
        match self {
            Self::Go => "server.go",
            Self::Python => "server.py",
            Self::Node => "server.js",
        }
    }

    pub fn run_command(self, file: &str) -> String {
        match self {
            Self::Go => format!("go run {file}"),
            Self::Python => format!("python3 {file}"),
            Self::Node => format!("node {file}"),
        }
    }

    /// Minimal hello-world HTTP server.
    pub fn server_skeleton(self) -> &'static str {
        match self {
            Self::Go => GO_SERVER,
            Self::Python => PYTHON_SERVER,
            Self::Node => NODE_SERVER,
        }
    }
}

const GO_SERVER: &str = r#"package main

import (
	"fmt"
	"log"
	"net/http"
)

func main() {
	http.HandleFunc("/", func(w http.ResponseWriter, r *http.Request) {
		fmt.Fprintln(w, "Hello World")
	})
	log.Println("listening on http://localhost:8080")
	log.Fatal(http.ListenAndServe(":8080", nil))
}
"#;

const PYTHON_SERVER: &str = r#"from http.server import BaseHTTPRequestHandler, HTTPServer


class Handler(BaseHTTPRequestHandler):
    def do_GET(self):
        self.send_response(200)
        self.send_header("Content-Type", "text/plain")
        self.end_headers()
        self.wfile.write(b"Hello World\n")


if __name__ == "__main__":
    print("listening on http://localhost:8080")
    HTTPServer(("", 8080), Handler).serve_forever()
"#;

const NODE_SERVER: &str = r#"const http = require("http");

const server = http.createServer((req, res) => {
  res.writeHead(200, { "Content-Type": "text/plain" });
  res.end("Hello World\n");
});

server.listen(8080, () => {
  console.log("listening on http://localhost:8080");
});
"#;

// ---------------------------------------------------------------------------
// Planner
// ---------------------------------------------------------------------------

/// Deterministic planner.  Never touches the network and never fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeuristicPlanner;

impl HeuristicPlanner {
    pub fn new() -> Self {
        Self
    }

    pub fn decide(&self, ctx: &PlanningContext<'_>) -> Decision {
        let lower = ctx.utterance.to_lowercase();
        let words = tokenize(&lower);

        if words.is_empty() {
            return Decision::conversational(DecisionSource::Heuristic);
        }

        if is_run_only(&words) {
            let (file, language) = last_script(ctx.recent).unwrap_or_else(|| {
                (
                    Language::Node.server_filename().to_owned(),
                    Language::Node,
                )
            });
            return Decision::with_tools(
                vec![ToolCall::shell(language.run_command(&file))],
                DecisionSource::Heuristic,
            );
        }

        if has_any(&words, WRITE_WORDS) && has_any(&words, SERVER_WORDS) {
            let language = Language::from_words(&words);
            let file = language.server_filename();
            let mut calls = vec![ToolCall::write_file(file, language.server_skeleton())];

            if words.contains(&"and") && has_any(&words, RUN_WORDS) {
                calls.push(ToolCall::shell(language.run_command(file)));
            }
            return Decision::with_tools(calls, DecisionSource::Heuristic);
        }

        Decision::conversational(DecisionSource::Heuristic)
    }
}

#[async_trait]
impl Planner for HeuristicPlanner {
    fn name(&self) -> &'static str {
        "heuristic"
    }

    async fn plan(&self, ctx: &PlanningContext<'_>) -> Result<Decision> {
        Ok(self.decide(ctx))
    }
}

fn tokenize(lower: &str) -> Vec<&str> {
    lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect()
}

fn has_any(words: &[&str], wanted: &[&str]) -> bool {
    words.iter().any(|w| wanted.contains(w))
}

/// "run", "run it", "please execute it", ...
fn is_run_only(words: &[&str]) -> bool {
    let rest = match words {
        ["please", rest @ ..] => rest,
        _ => words,
    };
    match rest {
        [verb] => RUN_WORDS.contains(verb),
        [verb, "it"] => RUN_WORDS.contains(verb),
        _ => false,
    }
}

/// Most recent script the model reported creating, newest turn first and
/// last file within a turn.  Only `Created '<file>'` acknowledgments count,
/// so file names in the environment listing or in user text are ignored.
fn last_script(recent: &[ConversationTurn]) -> Option<(String, Language)> {
    recent
        .iter()
        .rev()
        .filter(|turn| turn.role == Role::Model)
        .find_map(|turn| {
            turn.text()
                .lines()
                .filter_map(|line| line.trim_start().strip_prefix("Created "))
                .flat_map(|created| {
                    let files = created.split(" and executed ").next().unwrap_or_default();
                    files.split('\'').skip(1).step_by(2)
                })
                .filter(|name| is_plain_filename(name))
                .filter_map(|name| Language::from_filename(name).map(|lang| (name, lang)))
                .last()
                .map(|(name, lang)| (name.to_owned(), lang))
        })
}

fn is_plain_filename(token: &str) -> bool {
    match token.rsplit_once('.') {
        Some((stem, _)) => {
            !stem.is_empty()
                && stem
                    .chars()
                    .all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '/' | '.'))
        }
        None => false,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
