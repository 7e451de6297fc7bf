// src/exec/task.rs

use std::sync::Arc;
use std::time::Duration;

use crate::config::ApplySettings;
use crate::exec::retry::RetryPolicy;
use crate::types::ModuleId;

/// Per-task execution limits shared by every task of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct ApplyPolicy {
    /// Start-to-close timeout for a single attempt.
    pub timeout: Duration,
    /// How often a live backend is expected to heartbeat.
    pub heartbeat_interval: Duration,
    /// Silence longer than this means the worker is gone.
    pub heartbeat_timeout: Duration,
    pub retry: RetryPolicy,
    /// Worker losses tolerated per module, on top of `retry.max_attempts`.
    pub max_worker_losses: u32,
}

impl From<&ApplySettings> for ApplyPolicy {
    fn from(settings: &ApplySettings) -> Self {
        Self {
            timeout: settings.timeout,
            heartbeat_interval: settings.heartbeat_interval,
            heartbeat_timeout: settings.heartbeat_timeout,
            retry: settings.retry.clone(),
            max_worker_losses: settings.max_worker_losses,
        }
    }
}

/// One dispatch of the apply operation for a single module.
#[derive(Debug, Clone)]
pub struct ApplyTask {
    /// Stable across retries of the same module, e.g. `apply-db-app-users`.
    pub task_id: String,
    pub module: ModuleId,
    pub stack: String,
    pub run_id: u64,
    /// Index of the level this module belongs to.
    pub level: usize,
    /// Logical attempt number, starting at 1.
    pub attempt: u32,
    /// Physical dispatch number, starting at 1. Exceeds `attempt` once a
    /// worker has been lost.
    pub dispatch: u32,
    pub policy: Arc<ApplyPolicy>,
}

impl ApplyTask {
    pub fn new(
        run_id: u64,
        stack: impl Into<String>,
        level: usize,
        module: impl Into<ModuleId>,
        policy: Arc<ApplyPolicy>,
    ) -> Self {
        let module = module.into();
        Self {
            task_id: task_id_for(&module),
            module,
            stack: stack.into(),
            run_id,
            level,
            attempt: 1,
            dispatch: 1,
            policy,
        }
    }

    /// The next logical attempt after a retryable failure.
    pub fn next_attempt(&self) -> Self {
        Self {
            attempt: self.attempt + 1,
            dispatch: self.dispatch + 1,
            ..self.clone()
        }
    }

    /// The same logical attempt on a fresh worker.
    pub fn redispatch(&self) -> Self {
        Self {
            dispatch: self.dispatch + 1,
            ..self.clone()
        }
    }
}

/// `apply-<module>` with path separators flattened.
pub fn task_id_for(module: &str) -> String {
    format!("apply-{}", module.replace('/', "-"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> Arc<ApplyPolicy> {
        Arc::new(ApplyPolicy {
            timeout: Duration::from_secs(600),
            heartbeat_interval: Duration::from_secs(25),
            heartbeat_timeout: Duration::from_secs(30),
            retry: RetryPolicy::no_retry(),
            max_worker_losses: 3,
        })
    }

    #[test]
    fn task_id_flattens_nested_modules() {
        assert_eq!(task_id_for("db/app-users"), "apply-db-app-users");
        assert_eq!(task_id_for("core"), "apply-core");
    }

    #[test]
    fn retries_and_redispatches_keep_identity() {
        let first = ApplyTask::new(7, "local", 2, "pes/keyvault", policy());
        let lost = first.redispatch();
        let retried = lost.next_attempt();

        assert_eq!((lost.attempt, lost.dispatch), (1, 2));
        assert_eq!((retried.attempt, retried.dispatch), (2, 3));
        assert_eq!(retried.task_id, first.task_id);
        assert_eq!(retried.level, 2);
    }
}
