//! Filesystem tools -- read, write and list files inside the working
//! directory.
//!
//! Every path is resolved against a [`Workspace`] root and rejected if it
//! would escape it (e.g. `../../etc/passwd`).

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use tandem_agent::{FunctionDeclaration, Tool, ToolOutput};
use tokio::time::Instant;
use tracing::debug;

use crate::error::{Result, ToolPackError};

/// Maximum characters returned per file read.
const MAX_FILE_READ_CHARS: usize = 16_000;

// ---------------------------------------------------------------------------
// Workspace
// ---------------------------------------------------------------------------

/// The directory all filesystem tools operate in.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let root = root
            .canonicalize()
            .or_else(|_| std::path::absolute(&root))
            .unwrap_or(root);
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a tool-supplied path and check it stays inside the root.
    ///
    /// The target may not exist yet, so the path is normalized lexically
    /// instead of canonicalized.
    pub fn resolve(&self, raw_path: &str) -> Result<PathBuf> {
        let candidate = if Path::new(raw_path).is_absolute() {
            PathBuf::from(raw_path)
        } else {
            self.root.join(raw_path)
        };
        let normalized = normalize_path(&candidate);

        if !normalized.starts_with(&self.root) {
            return Err(ToolPackError::OutsideRoot {
                path: raw_path.to_owned(),
                root: self.root.display().to_string(),
            });
        }
        Ok(normalized)
    }
}

/// Resolve `.` and `..` components without touching the filesystem.
fn normalize_path(path: &Path) -> PathBuf {
    let mut components = Vec::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                if matches!(components.last(), Some(Component::Normal(_))) {
                    components.pop();
                } else {
                    components.push(component);
                }
            }
            Component::CurDir => {}
            _ => components.push(component),
        }
    }
    components.iter().collect()
}

fn require_str<'a>(args: &'a Map<String, Value>, field: &str) -> Result<&'a str> {
    args.get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| ToolPackError::InvalidParams {
            reason: format!("missing required string field `{field}`"),
        })
}

// ---------------------------------------------------------------------------
// read_file
// ---------------------------------------------------------------------------

/// `read_file {path}`.
#[derive(Debug, Clone)]
pub struct ReadFile {
    workspace: Arc<Workspace>,
}

impl ReadFile {
    pub const NAME: &'static str = "read_file";

    pub fn new(workspace: Arc<Workspace>) -> Self {
        Self { workspace }
    }

    async fn read(&self, args: &Map<String, Value>) -> Result<String> {
        let path = self.workspace.resolve(require_str(args, "path")?)?;
        debug!(path = %path.display(), "reading file");

        let raw = tokio::fs::read_to_string(&path).await?;
        if raw.len() <= MAX_FILE_READ_CHARS {
            return Ok(raw);
        }

        let mut end = MAX_FILE_READ_CHARS;
        while !raw.is_char_boundary(end) {
            end -= 1;
        }
        Ok(format!(
            "{}\n\n[... file truncated at {end} of {} bytes]",
            &raw[..end],
            raw.len()
        ))
    }
}

#[async_trait]
impl Tool for ReadFile {
    fn declaration(&self) -> FunctionDeclaration {
        FunctionDeclaration {
            name: Self::NAME.into(),
            description: "Read the contents of a text file".into(),
            schema: json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string", "description": "File path, relative to the working directory"}
                },
                "required": ["path"]
            }),
        }
    }

    async fn execute(
        &self,
        args: &Map<String, Value>,
        _deadline: Instant,
    ) -> tandem_agent::Result<ToolOutput> {
        self.read(args)
            .await
            .map(ToolOutput::Text)
            .map_err(|e| e.into_agent_error(Self::NAME))
    }
}

// ---------------------------------------------------------------------------
// write_file
// ---------------------------------------------------------------------------

/// `write_file {file_path | path, content}`.  Creates parent directories.
#[derive(Debug, Clone)]
pub struct WriteFile {
    workspace: Arc<Workspace>,
}

impl WriteFile {
    pub const NAME: &'static str = "write_file";

    pub fn new(workspace: Arc<Workspace>) -> Self {
        Self { workspace }
    }

    async fn write(&self, args: &Map<String, Value>) -> Result<String> {
        let raw_path = args
            .get("file_path")
            .or_else(|| args.get("path"))
            .and_then(Value::as_str)
            .ok_or_else(|| ToolPackError::InvalidParams {
                reason: "missing required string field `file_path`".into(),
            })?;
        let content = require_str(args, "content")?;
        let path = self.workspace.resolve(raw_path)?;
        debug!(path = %path.display(), bytes = content.len(), "writing file");

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, content).await?;

        Ok(format!("Wrote {} bytes to {}", content.len(), path.display()))
    }
}

#[async_trait]
impl Tool for WriteFile {
    fn declaration(&self) -> FunctionDeclaration {
        FunctionDeclaration {
            name: Self::NAME.into(),
            description: "Create or overwrite a file with the given content".into(),
            schema: json!({
                "type": "object",
                "properties": {
                    "file_path": {"type": "string", "description": "File path, relative to the working directory"},
                    "content": {"type": "string", "description": "Full file content"}
                },
                "required": ["content"]
            }),
        }
    }

    async fn execute(
        &self,
        args: &Map<String, Value>,
        _deadline: Instant,
    ) -> tandem_agent::Result<ToolOutput> {
        self.write(args)
            .await
            .map(ToolOutput::Text)
            .map_err(|e| e.into_agent_error(Self::NAME))
    }
}

// ---------------------------------------------------------------------------
// list_directory
// ---------------------------------------------------------------------------

/// `list_directory {path}`.  Directories are suffixed with `/`.
#[derive(Debug, Clone)]
pub struct ListDirectory {
    workspace: Arc<Workspace>,
}

impl ListDirectory {
    pub const NAME: &'static str = "list_directory";

    pub fn new(workspace: Arc<Workspace>) -> Self {
        Self { workspace }
    }

    async fn list(&self, args: &Map<String, Value>) -> Result<String> {
        let raw_path = args.get("path").and_then(Value::as_str).unwrap_or(".");
        let path = self.workspace.resolve(raw_path)?;
        debug!(path = %path.display(), "listing directory");

        let mut names = Vec::new();
        let mut read_dir = tokio::fs::read_dir(&path).await?;
        while let Some(entry) = read_dir.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if entry.file_type().await?.is_dir() {
                names.push(format!("{name}/"));
            } else {
                names.push(name);
            }
        }
        names.sort();

        if names.is_empty() {
            return Ok(format!("{} is empty", path.display()));
        }
        Ok(names.join("\n"))
    }
}

#[async_trait]
impl Tool for ListDirectory {
    fn declaration(&self) -> FunctionDeclaration {
        FunctionDeclaration {
            name: Self::NAME.into(),
            description: "List the entries of a directory".into(),
            schema: json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string", "description": "Directory path (default: working directory)"}
                },
                "required": []
            }),
        }
    }

    async fn execute(
        &self,
        args: &Map<String, Value>,
        _deadline: Instant,
    ) -> tandem_agent::Result<ToolOutput> {
        self.list(args)
            .await
            .map(ToolOutput::Text)
            .map_err(|e| e.into_agent_error(Self::NAME))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
