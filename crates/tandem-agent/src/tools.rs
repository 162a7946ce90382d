//! Tool capability registry.
//!
//! Concrete tools (file I/O, process spawning, ...) live outside this crate.
//! The pipeline only sees them through [`ToolRegistry`]: look a tool up by
//! name, read its declaration, call [`Tool::execute`].

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use jsonschema::{Draft, JSONSchema};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::time::Instant;

use crate::error::Result;
use crate::history::Part;

/// Name of the file-writing tool the planners emit.
pub const WRITE_FILE: &str = "write_file";

/// Name of the shell tool the planners emit.
pub const RUN_SHELL_COMMAND: &str = "run_shell_command";

// ---------------------------------------------------------------------------
// Plan entries
// ---------------------------------------------------------------------------

/// One tool invocation chosen for a turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    #[serde(default)]
    pub args: Map<String, Value>,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, args: Map<String, Value>) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }

    /// A `write_file` call.
    pub fn write_file(path: impl Into<String>, content: impl Into<String>) -> Self {
        let mut args = Map::new();
        args.insert("file_path".into(), Value::String(path.into()));
        args.insert("content".into(), Value::String(content.into()));
        Self::new(WRITE_FILE, args)
    }

    /// A `run_shell_command` call.
    pub fn shell(command: impl Into<String>) -> Self {
        let mut args = Map::new();
        args.insert("command".into(), Value::String(command.into()));
        Self::new(RUN_SHELL_COMMAND, args)
    }

    /// String argument by key.
    pub fn arg_str(&self, key: &str) -> Option<&str> {
        self.args.get(key).and_then(Value::as_str)
    }

    /// Target path of a file-writing call (`file_path`, or `path`).
    pub fn target_path(&self) -> Option<&str> {
        self.arg_str("file_path").or_else(|| self.arg_str("path"))
    }
}

/// Ordered tool calls for one turn.
pub type ToolCallPlan = Vec<ToolCall>;

// ---------------------------------------------------------------------------
// Declarations and output
// ---------------------------------------------------------------------------

/// What a tool advertises to the remote planner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDeclaration {
    pub name: String,
    pub description: String,
    /// JSON Schema of the arguments object.
    pub schema: Value,
}

impl FunctionDeclaration {
    /// Required argument names listed by the schema.
    pub fn required_args(&self) -> Vec<&str> {
        self.schema["required"]
            .as_array()
            .map(|names| names.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }

    /// Compact `name(arg1, arg2?)` form used in planner prompts.
    pub fn signature(&self) -> String {
        let required = self.required_args();
        let args: Vec<String> = self.schema["properties"]
            .as_object()
            .map(|props| {
                props
                    .keys()
                    .map(|k| {
                        if required.contains(&k.as_str()) {
                            k.clone()
                        } else {
                            format!("{k}?")
                        }
                    })
                    .collect()
            })
            .unwrap_or_default();
        format!("{}({})", self.name, args.join(", "))
    }
}

/// Content a tool hands back.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutput {
    Text(String),
    Parts(Vec<Part>),
    Part(Part),
}

impl ToolOutput {
    /// Flatten to plain text by concatenation.
    pub fn to_text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Parts(parts) => parts.iter().map(part_text).collect(),
            Self::Part(part) => part_text(part),
        }
    }
}

fn part_text(part: &Part) -> String {
    match part {
        Part::Text(text) => text.clone(),
        Part::Structured(Value::String(s)) => s.clone(),
        Part::Structured(value) => match value.get("output").or_else(|| value.get("text")) {
            Some(Value::String(s)) => s.clone(),
            _ => value.to_string(),
        },
    }
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// A side-effecting capability the pipeline can invoke.
#[async_trait]
pub trait Tool: Send + Sync {
    fn declaration(&self) -> FunctionDeclaration;

    /// Run the tool.  Implementations should stop by `deadline`; the
    /// executor enforces it regardless.
    async fn execute(&self, args: &Map<String, Value>, deadline: Instant) -> Result<ToolOutput>;
}

/// Name → tool lookup.
pub trait ToolRegistry: Send + Sync {
    fn get_tool(&self, name: &str) -> Option<Arc<dyn Tool>>;

    fn function_declarations(&self) -> Vec<FunctionDeclaration>;
}

/// [`ToolRegistry`] backed by an ordered map.
#[derive(Default, Clone)]
pub struct MapRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl MapRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool under its declared name, replacing any previous one.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.declaration().name;
        self.tools.insert(name, tool);
    }

    pub fn with(mut self, tool: Arc<dyn Tool>) -> Self {
        self.register(tool);
        self
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl std::fmt::Debug for MapRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapRegistry")
            .field("tools", &self.tools.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ToolRegistry for MapRegistry {
    fn get_tool(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    fn function_declarations(&self) -> Vec<FunctionDeclaration> {
        self.tools.values().map(|t| t.declaration()).collect()
    }
}

/// Validate `args` against the declaration's JSON Schema (draft 7).
///
/// On failure the error lists every violation as `<pointer>: <message>`.
pub fn validate_args(
    declaration: &FunctionDeclaration,
    args: &Map<String, Value>,
) -> std::result::Result<(), String> {
    if declaration.schema.is_null() {
        return Ok(());
    }

    let schema = JSONSchema::options()
        .with_draft(Draft::Draft7)
        .compile(&declaration.schema)
        .map_err(|e| format!("tool declares an invalid argument schema: {e}"))?;

    let instance = Value::Object(args.clone());
    if let Err(errors) = schema.validate(&instance) {
        let messages: Vec<String> = errors
            .map(|e| {
                let pointer = e.instance_path.to_string();
                if pointer.is_empty() {
                    e.to_string()
                } else {
                    format!("{pointer}: {e}")
                }
            })
            .collect();
        return Err(messages.join("; "));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn write_decl() -> FunctionDeclaration {
        FunctionDeclaration {
            name: WRITE_FILE.into(),
            description: "Write a file".into(),
            schema: json!({
                "type": "object",
                "properties": {
                    "file_path": {"type": "string"},
                    "content": {"type": "string"},
                    "append": {"type": "boolean"}
                },
                "required": ["file_path", "content"]
            }),
        }
    }

    #[test]
    fn signature_marks_optional_args() {
        assert_eq!(
            write_decl().signature(),
            "write_file(append?, content, file_path)"
        );
    }

    #[test]
    fn validate_args_reports_missing_fields() {
        let call = ToolCall::write_file("a.txt", "x");
        assert!(validate_args(&write_decl(), &call.args).is_ok());

        let mut args = Map::new();
        args.insert("file_path".into(), json!("a.txt"));
        args.insert("content".into(), Value::Null);
        let err = validate_args(&write_decl(), &args).unwrap_err();
        assert!(err.contains("/content"), "{err}");

        args.remove("content");
        let err = validate_args(&write_decl(), &args).unwrap_err();
        assert!(err.contains("\"content\" is a required property"), "{err}");
    }

    #[test]
    fn validate_args_rejects_wrong_types() {
        let shell = FunctionDeclaration {
            name: RUN_SHELL_COMMAND.into(),
            description: "Run a command".into(),
            schema: json!({
                "type": "object",
                "properties": {"command": {"type": "string"}},
                "required": ["command"]
            }),
        };
        let mut args = Map::new();
        args.insert("command".into(), json!(42));
        let err = validate_args(&shell, &args).unwrap_err();
        assert!(err.starts_with("/command: "), "{err}");
        assert!(err.contains("string"), "{err}");

        let mut args = Map::new();
        args.insert("file_path".into(), json!("a.txt"));
        args.insert("content".into(), json!("x"));
        args.insert("append".into(), json!("yes"));
        let err = validate_args(&write_decl(), &args).unwrap_err();
        assert!(err.contains("/append"), "{err}");
    }

    #[test]
    fn validate_args_skips_tools_without_schema() {
        let decl = FunctionDeclaration {
            name: "anything".into(),
            description: String::new(),
            schema: Value::Null,
        };
        assert!(validate_args(&decl, &Map::new()).is_ok());
    }

    #[test]
    fn output_normalization_concatenates() {
        assert_eq!(ToolOutput::Text("a".into()).to_text(), "a");
        assert_eq!(
            ToolOutput::Parts(vec![
                Part::Text("a".into()),
                Part::Structured(json!({"output": "b"})),
                Part::Text("c".into()),
            ])
            .to_text(),
            "abc"
        );
        assert_eq!(
            ToolOutput::Part(Part::Structured(json!({"code": 1}))).to_text(),
            r#"{"code":1}"#
        );
        assert_eq!(ToolOutput::Parts(vec![]).to_text(), "");
    }

    #[test]
    fn target_path_accepts_both_spellings() {
        assert_eq!(ToolCall::write_file("a", "b").target_path(), Some("a"));
        let mut args = Map::new();
        args.insert("path".into(), json!("b"));
        assert_eq!(ToolCall::new(WRITE_FILE, args).target_path(), Some("b"));
    }
}
