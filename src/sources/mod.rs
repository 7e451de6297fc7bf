// src/sources/mod.rs

//! Inputs of a run: the stack's dependency graph and the set of modules
//! changed since a base revision.
//!
//! Both are fetched through small traits so tests (and `--graph-file` /
//! `--changed`) can bypass the external tools.

use std::future::Future;
use std::pin::Pin;

pub mod changes;
pub mod graph;

pub use changes::{ChangeDetector, GitChangeDetector, StaticChangeDetector, modules_for_files};
pub use graph::{CommandGraphSource, FileGraphSource, GraphSource};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
