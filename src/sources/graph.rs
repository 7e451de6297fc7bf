// src/sources/graph.rs

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use anyhow::{Context, bail};
use tokio::process::Command;
use tracing::debug;

use crate::fs::{FileSystem, RealFileSystem};
use crate::sources::BoxFuture;

/// Produces the textual `digraph` description of a stack.
pub trait GraphSource: Send + Sync {
    /// `stack_dir` is `<repo>/<infra_dir>/<stack>`.
    fn graph_text<'a>(&'a self, stack_dir: &'a Path) -> BoxFuture<'a, anyhow::Result<String>>;
}

/// Runs the planner (by default `terragrunt dag graph`) in the stack
/// directory and returns its stdout.
#[derive(Debug, Clone)]
pub struct CommandGraphSource {
    command: Vec<String>,
}

impl CommandGraphSource {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }
}

impl GraphSource for CommandGraphSource {
    fn graph_text<'a>(&'a self, stack_dir: &'a Path) -> BoxFuture<'a, anyhow::Result<String>> {
        Box::pin(async move {
            let Some((program, args)) = self.command.split_first() else {
                bail!("graph command is empty");
            };
            debug!(dir = %stack_dir.display(), program = %program, "generating dependency graph");

            let output = Command::new(program)
                .args(args)
                .current_dir(stack_dir)
                .stdin(Stdio::null())
                .kill_on_drop(true)
                .output()
                .await
                .with_context(|| format!("running '{}' in {}", self.command.join(" "), stack_dir.display()))?;

            if !output.status.success() {
                bail!(
                    "'{}' exited with {}: {}",
                    self.command.join(" "),
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                );
            }
            String::from_utf8(output.stdout).context("graph output is not valid UTF-8")
        })
    }
}

/// Reads a previously captured description from a file.
#[derive(Debug, Clone)]
pub struct FileGraphSource {
    path: PathBuf,
    fs: Arc<dyn FileSystem>,
}

impl FileGraphSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_fs(path, Arc::new(RealFileSystem))
    }

    pub fn with_fs(path: impl Into<PathBuf>, fs: Arc<dyn FileSystem>) -> Self {
        Self {
            path: path.into(),
            fs,
        }
    }
}

impl GraphSource for FileGraphSource {
    fn graph_text<'a>(&'a self, _stack_dir: &'a Path) -> BoxFuture<'a, anyhow::Result<String>> {
        Box::pin(async move { self.fs.read_to_string(&self.path) })
    }
}
