// src/errors.rs

//! Crate-wide error type.

use thiserror::Error;

use crate::types::{ErrorClass, ModuleId};

#[derive(Error, Debug)]
pub enum InfraflowError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Cycle detected in dependency graph: {0}")]
    DagCycle(String),

    /// A preliminary step (graph sourcing, change detection) gave up.
    #[error("{step} failed: {message}")]
    Collaborator { step: String, message: String },

    /// A module ended in a terminal failure; the run was aborted.
    #[error(
        "apply of module '{module}' failed at level {level} after {attempts} attempt(s) [{class}]: {message}"
    )]
    ApplyFailed {
        module: ModuleId,
        level: usize,
        attempts: u32,
        class: ErrorClass,
        message: String,
    },

    /// A shutdown was requested before every level was applied.
    #[error("run {run_id} interrupted before all levels were applied")]
    Interrupted { run_id: u64 },

    #[error("coordinator event channel closed before the run finished")]
    ChannelClosed,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, InfraflowError>;
