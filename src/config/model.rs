// src/config/model.rs

use std::collections::BTreeSet;
use std::time::Duration;

use regex::Regex;
use serde::Deserialize;

use crate::exec::retry::RetryPolicy;
use crate::types::{CyclePolicy, ErrorClass};

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [config]
/// stack = "local"
/// infra_dir = "infra"
/// cycle_policy = "best_effort"
///
/// [apply]
/// timeout = "10m"
/// heartbeat_interval = "25s"
/// heartbeat_timeout = "30s"
/// non_retryable = ["validation"]
///
/// [apply.retry]
/// initial_interval = "5s"
/// maximum_interval = "5m"
/// multiplier = 2.0
/// max_attempts = 5
///
/// [preliminary]
/// timeout = "1m"
/// graph_command = ["terragrunt", "dag", "graph"]
/// ```
///
/// All sections are optional. Missing values are filled in during
/// validation, which produces a [`ConfigFile`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub config: ConfigSection,

    #[serde(default)]
    pub apply: RawApplySection,

    #[serde(default)]
    pub preliminary: RawPreliminarySection,
}

/// `[config]` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ConfigSection {
    /// Default stack (e.g. `"local"`); the CLI `--stack` flag wins.
    #[serde(default)]
    pub stack: Option<String>,

    /// Directory under the repository root that holds one directory per stack.
    #[serde(default = "default_infra_dir")]
    pub infra_dir: String,

    #[serde(default)]
    pub cycle_policy: CyclePolicy,
}

fn default_infra_dir() -> String {
    "infra".to_string()
}

impl Default for ConfigSection {
    fn default() -> Self {
        Self {
            stack: None,
            infra_dir: default_infra_dir(),
            cycle_policy: CyclePolicy::default(),
        }
    }
}

/// A `[*.retry]` table. Unset fields take the defaults of the phase the
/// table belongs to.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawRetrySection {
    pub initial_interval: Option<String>,
    pub maximum_interval: Option<String>,
    pub multiplier: Option<f64>,
    pub max_attempts: Option<u32>,
}

/// `[apply]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawApplySection {
    /// Start-to-close timeout for one apply attempt.
    pub timeout: Option<String>,
    pub heartbeat_interval: Option<String>,
    pub heartbeat_timeout: Option<String>,
    pub max_worker_losses: Option<u32>,
    /// Program and arguments run inside each module directory.
    pub command: Option<Vec<String>>,
    /// Error classes that fail a module immediately.
    pub non_retryable: Option<Vec<ErrorClass>>,
    /// Regexes over tool output that mark a failed run as a validation error.
    pub validation_patterns: Option<Vec<String>>,
    #[serde(default)]
    pub retry: RawRetrySection,
}

/// `[preliminary]` section: graph sourcing and change detection.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawPreliminarySection {
    pub timeout: Option<String>,
    pub graph_command: Option<Vec<String>>,
    #[serde(default)]
    pub retry: RawRetrySection,
}

/// Validated settings for the apply phase.
#[derive(Debug, Clone)]
pub struct ApplySettings {
    pub timeout: Duration,
    pub heartbeat_interval: Duration,
    pub heartbeat_timeout: Duration,
    pub max_worker_losses: u32,
    pub command: Vec<String>,
    pub validation_patterns: Vec<Regex>,
    pub retry: RetryPolicy,
}

/// Validated settings for the preliminary steps.
#[derive(Debug, Clone)]
pub struct PreliminarySettings {
    pub timeout: Duration,
    pub graph_command: Vec<String>,
    pub retry: RetryPolicy,
}

pub(crate) const DEFAULT_APPLY_TIMEOUT: &str = "10m";
pub(crate) const DEFAULT_HEARTBEAT_INTERVAL: &str = "25s";
pub(crate) const DEFAULT_HEARTBEAT_TIMEOUT: &str = "30s";
pub(crate) const DEFAULT_MAX_WORKER_LOSSES: u32 = 3;
pub(crate) const DEFAULT_PRELIMINARY_TIMEOUT: &str = "1m";

pub(crate) fn default_apply_command() -> Vec<String> {
    ["terragrunt", "apply", "--backend-bootstrap", "--auto-approve"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

pub(crate) fn default_graph_command() -> Vec<String> {
    ["terragrunt", "dag", "graph"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

pub(crate) fn default_non_retryable() -> BTreeSet<ErrorClass> {
    BTreeSet::from([ErrorClass::Validation])
}

pub(crate) fn default_validation_patterns() -> Vec<String> {
    vec![
        r"(?i)error:\s+(invalid|unsupported|missing required)\s+(argument|block|attribute)".to_string(),
        r"(?i)error:\s+reference to undeclared".to_string(),
        r"(?i)validation failed".to_string(),
    ]
}

/// Fully validated configuration.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub config: ConfigSection,
    pub apply: ApplySettings,
    pub preliminary: PreliminarySettings,
}

impl ConfigFile {
    /// Built-in defaults, used when no config file exists.
    pub fn defaults() -> crate::errors::Result<Self> {
        Self::try_from(RawConfigFile::default())
    }

    /// Effective stack: an explicit override, else `[config].stack`.
    pub fn stack<'a>(&'a self, overridden: Option<&'a str>) -> Option<&'a str> {
        overridden.or(self.config.stack.as_deref())
    }
}
