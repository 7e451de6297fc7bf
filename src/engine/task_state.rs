// src/engine/task_state.rs

//! Per-module state within the level currently being applied.

use crate::exec::ApplyFailure;

/// Lifecycle of one module in the current level.
///
/// ```text
/// Running -> Succeeded
///         -> Pending (retry scheduled) -> Running -> ...
///         -> Failed (terminal)
///         -> Abandoned (the run aborted before a retry could start)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Waiting for a retry backoff to elapse.
    Pending,
    /// An attempt has been dispatched and not yet reported back.
    Running,
    Succeeded,
    /// Non-retryable failure, or a retry budget was exhausted.
    Failed,
    /// Would have been retried, but the run is aborting.
    Abandoned,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Succeeded | TaskState::Failed | TaskState::Abandoned
        )
    }
}

/// Bookkeeping for one module (internal to the core).
#[derive(Debug, Clone)]
pub(crate) struct TaskRecord {
    pub state: TaskState,
    /// Logical attempts started so far.
    pub attempts: u32,
    /// Physical dispatches so far; identifies the attempt in flight.
    pub dispatch: u32,
    pub worker_losses: u32,
    pub last_failure: Option<ApplyFailure>,
}

impl TaskRecord {
    /// A module whose first attempt has just been dispatched.
    pub fn dispatched() -> Self {
        Self {
            state: TaskState::Running,
            attempts: 1,
            dispatch: 1,
            worker_losses: 0,
            last_failure: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_settled_states_are_terminal() {
        assert!(!TaskState::Pending.is_terminal());
        assert!(!TaskState::Running.is_terminal());
        assert!(TaskState::Succeeded.is_terminal());
        assert!(TaskState::Failed.is_terminal());
        assert!(TaskState::Abandoned.is_terminal());
    }
}
