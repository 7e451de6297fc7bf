// src/types.rs

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

/// Module identifier: a normalized relative path such as `"db/app-users"`.
///
/// Equality is exact and case-sensitive.
pub type ModuleId = String;

/// What the leveler does when the remaining nodes all have unmet
/// dependencies (i.e. the graph contains a cycle).
///
/// - `BestEffort`: emit every remaining node as one final level.
/// - `Strict`: refuse to produce an order and report the cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CyclePolicy {
    #[default]
    BestEffort,
    Strict,
}

impl FromStr for CyclePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "best_effort" => Ok(CyclePolicy::BestEffort),
            "strict" => Ok(CyclePolicy::Strict),
            other => Err(format!(
                "invalid cycle_policy: {other} (expected \"best_effort\" or \"strict\")"
            )),
        }
    }
}

/// Classification of a failed apply attempt.
///
/// Whether a class is retried is decided by the retry policy
/// (`[apply].non_retryable`), not by the backend that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// The tool rejected the configuration (plan/validation error).
    #[serde(alias = "plan")]
    Validation,
    /// The tool ran and exited unsuccessfully for any other reason.
    Tool,
    /// The attempt exceeded its start-to-close timeout.
    Timeout,
    /// The tool process could not be started.
    Spawn,
    /// Heartbeats stopped: the worker running the attempt is presumed dead.
    WorkerLost,
}

impl ErrorClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorClass::Validation => "validation",
            ErrorClass::Tool => "tool",
            ErrorClass::Timeout => "timeout",
            ErrorClass::Spawn => "spawn",
            ErrorClass::WorkerLost => "worker_lost",
        }
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ErrorClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "validation" | "plan" => Ok(ErrorClass::Validation),
            "tool" => Ok(ErrorClass::Tool),
            "timeout" => Ok(ErrorClass::Timeout),
            "spawn" => Ok(ErrorClass::Spawn),
            "worker_lost" => Ok(ErrorClass::WorkerLost),
            other => Err(format!("unknown error class: {other}")),
        }
    }
}
