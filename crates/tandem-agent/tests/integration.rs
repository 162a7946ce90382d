//! Integration tests for the tandem-agent crate.
//!
//! These tests exercise history curation, heuristic planning, plan parsing
//! and reply composition through the public API, without a live service.

use std::path::Path;

use serde_json::json;

use tandem_agent::intent::remote::parse_decision;
use tandem_agent::{
    ClientConfig, ConversationStore, ConversationTurn, DecisionSource, HeuristicPlanner, Mode,
    Part, PlanningContext, RawTurn, Role, ToolCall, acknowledge, curate_turns,
    extract_implicit_actions,
};

fn plan(utterance: &str, recent: &[ConversationTurn]) -> Vec<ToolCall> {
    HeuristicPlanner::new()
        .decide(&PlanningContext {
            utterance,
            recent,
            working_dir: Path::new("/tmp/work"),
            declarations: &[],
        })
        .tool_calls
}

// ═══════════════════════════════════════════════════════════════════════
//  History curation
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn curation_repairs_a_messy_history() {
    let history = vec![
        ConversationTurn::model("orphan reply"),
        ConversationTurn::user("first"),
        ConversationTurn::user("second"),
        ConversationTurn::model("answer"),
        ConversationTurn::user("broken"),
        ConversationTurn {
            role: Role::Model,
            parts: vec![],
        },
        ConversationTurn::user("last"),
    ];

    let curated = curate_turns(&history);
    let summary: Vec<(Role, String)> = curated.iter().map(|t| (t.role, t.text())).collect();
    assert_eq!(
        summary,
        vec![
            (Role::User, "first\nsecond".to_owned()),
            (Role::Model, "answer".to_owned()),
            (Role::User, "last".to_owned()),
        ]
    );
    assert_eq!(curate_turns(&curated), curated);
}

#[test]
fn store_curation_never_mutates_raw_history() {
    let mut store = ConversationStore::new();
    store.append(ConversationTurn::user("a"));
    store.append(ConversationTurn::model(""));
    let _ = store.curate();
    assert_eq!(store.len(), 2);
}

#[test]
fn restored_history_accepts_structured_parts() {
    let mut store = ConversationStore::new();
    let raw: Vec<RawTurn> = serde_json::from_value(json!([
        {"role": "user", "parts": [{"text": "hi"}]},
        {"role": "model", "parts": [{"structured": {"tool": "x"}}]}
    ]))
    .unwrap();
    store.set_history(raw).unwrap();

    let curated = store.curate();
    assert_eq!(curated.len(), 2);
    assert!(matches!(curated[1].parts[0], Part::Structured(_)));
}

// ═══════════════════════════════════════════════════════════════════════
//  Heuristic planning
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn end_to_end_request_plans_write_then_run() {
    let calls = plan(
        "write a simple golang server for hello world and execute it",
        &[],
    );
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].name, "write_file");
    assert_eq!(calls[0].target_path(), Some("server.go"));
    assert!(calls[0].arg_str("content").unwrap().contains("http"));
    assert_eq!(calls[1].arg_str("command"), Some("go run server.go"));
    assert_eq!(
        acknowledge(&calls),
        "Created 'server.go' and executed 'go run server.go'"
    );
}

#[test]
fn run_follows_node_history() {
    let recent = vec![
        ConversationTurn::user("make a node hello server"),
        ConversationTurn::model("Created 'server.js'."),
    ];
    let calls = plan("start it", &recent);
    assert_eq!(calls[0].arg_str("command"), Some("node server.js"));
}

#[test]
fn heuristic_decisions_are_tagged() {
    let decision = HeuristicPlanner::new().decide(&PlanningContext {
        utterance: "hi",
        recent: &[],
        working_dir: Path::new("."),
        declarations: &[],
    });
    assert_eq!(decision.source, DecisionSource::Heuristic);
    assert!(!decision.needs_tools);
}

// ═══════════════════════════════════════════════════════════════════════
//  Remote plan parsing
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn remote_plan_with_prose_and_fences() {
    let text = "I'll do that.\n```\n{\"needsTools\": true, \"toolCalls\": [\
                {\"name\": \"write_file\", \"args\": {\"path\": \"a.txt\", \"content\": \"{}\"}}]}\n```";
    let decision = parse_decision(text).unwrap();
    assert_eq!(decision.source, DecisionSource::Remote);
    assert_eq!(decision.tool_calls[0].target_path(), Some("a.txt"));
    assert_eq!(decision.tool_calls[0].arg_str("content"), Some("{}"));
}

// ═══════════════════════════════════════════════════════════════════════
//  Implicit actions
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn implicit_actions_cover_multiple_blocks() {
    let text = "First `main.go`:\n```go\npackage main\n```\n\
                Then the client:\n```js\n// client.js\nfetch('/')\n```";
    let calls = extract_implicit_actions(text);
    let names: Vec<&str> = calls.iter().filter_map(|c| c.target_path()).collect();
    assert_eq!(names, vec!["main.go", "client.js"]);
    assert_eq!(acknowledge(&calls), "Created 'main.go', 'client.js'");
}

// ═══════════════════════════════════════════════════════════════════════
//  Configuration
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn config_from_toml_fills_defaults() {
    let config = ClientConfig::from_toml_str(
        r#"
        base_url = "http://reasoner:9000/"
        default_mode = "code"
        implicit_actions = true
        "#,
    )
    .unwrap();

    assert_eq!(config.default_mode, Mode::Code);
    assert!(config.implicit_actions);
    assert_eq!(config.history_window, 6);
    assert_eq!(config.endpoint("/chat"), "http://reasoner:9000/chat");
    config.validate().unwrap();
}
