//! Reference tools for Tandem.
//!
//! Filesystem access and shell execution scoped to one working directory,
//! packaged as a [`MapRegistry`] the turn pipeline can call into.

pub mod error;
pub mod filesystem;
pub mod shell;

use std::path::Path;
use std::sync::Arc;

use tandem_agent::MapRegistry;

pub use error::{Result, ToolPackError};
pub use filesystem::{ListDirectory, ReadFile, Workspace, WriteFile};
pub use shell::RunShellCommand;

/// Build a registry holding every reference tool, rooted at `working_dir`.
pub fn default_registry(working_dir: &Path) -> MapRegistry {
    let workspace = Arc::new(Workspace::new(working_dir));
    MapRegistry::new()
        .with(Arc::new(ReadFile::new(workspace.clone())))
        .with(Arc::new(WriteFile::new(workspace.clone())))
        .with(Arc::new(ListDirectory::new(workspace.clone())))
        .with(Arc::new(RunShellCommand::new(workspace.root())))
}
