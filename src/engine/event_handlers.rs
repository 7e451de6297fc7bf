// src/engine/event_handlers.rs

//! Event handling logic for the coordinator core.

use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::engine::core::{AbortReason, CoordinatorCore, Phase};
use crate::engine::task_state::TaskState;
use crate::exec::{ApplyFailure, ApplyTask, AttemptOutcome};
use crate::types::ErrorClass;

/// Command produced by the pure core, to be executed by the async shell.
#[derive(Debug, Clone)]
pub enum CoreCommand {
    /// Run one supervised attempt for each of these tasks.
    DispatchTasks(Vec<ApplyTask>),
    /// Deliver `RetryDue { task }` back to the core after `delay`.
    ScheduleRetry { task: ApplyTask, delay: Duration },
    /// The run is over; collect the result with `into_result`.
    Finish,
}

/// Decision returned by the core after handling a single event.
#[derive(Debug, Clone)]
pub struct CoreStep {
    pub commands: Vec<CoreCommand>,
    /// Whether the shell should keep waiting for events.
    pub keep_running: bool,
}

impl CoreStep {
    pub(crate) fn running(commands: Vec<CoreCommand>) -> Self {
        Self {
            commands,
            keep_running: true,
        }
    }

    pub(crate) fn idle() -> Self {
        Self::running(Vec::new())
    }

    pub(crate) fn stopped() -> Self {
        Self {
            commands: Vec::new(),
            keep_running: false,
        }
    }
}

impl CoordinatorCore {
    pub(super) fn handle_attempt_finished(
        &mut self,
        task: ApplyTask,
        outcome: AttemptOutcome,
    ) -> CoreStep {
        if task.level != self.current {
            debug!(module = %task.module, level = task.level, "ignoring report from another level");
            return CoreStep::idle();
        }

        let aborting = self.abort.is_some();
        let policy = &self.policy;
        let rec = match self.tasks.get_mut(&task.module) {
            Some(rec) if rec.state == TaskState::Running && rec.dispatch == task.dispatch => rec,
            _ => {
                debug!(
                    module = %task.module,
                    dispatch = task.dispatch,
                    "ignoring stale attempt report"
                );
                return CoreStep::idle();
            }
        };

        let mut commands = Vec::new();
        let mut terminal: Option<ApplyFailure> = None;

        match outcome {
            AttemptOutcome::Succeeded => {
                rec.state = TaskState::Succeeded;
                info!(
                    module = %task.module,
                    run_id = task.run_id,
                    level = task.level,
                    attempt = task.attempt,
                    "module applied"
                );
            }

            AttemptOutcome::Failed(failure) => {
                let retryable = policy.retry.should_retry(failure.class, rec.attempts);
                if retryable && !aborting {
                    let delay = policy.retry.delay_for_retry(rec.attempts - 1);
                    let next = task.next_attempt();
                    warn!(
                        module = %task.module,
                        run_id = task.run_id,
                        attempt = task.attempt,
                        class = %failure.class,
                        error = %failure.message,
                        ?delay,
                        "apply attempt failed; retrying"
                    );
                    rec.state = TaskState::Pending;
                    rec.attempts = next.attempt;
                    rec.dispatch = next.dispatch;
                    rec.last_failure = Some(failure);
                    commands.push(CoreCommand::ScheduleRetry { task: next, delay });
                } else if retryable {
                    warn!(
                        module = %task.module,
                        class = %failure.class,
                        "apply attempt failed while run is aborting; not retrying"
                    );
                    rec.state = TaskState::Abandoned;
                    rec.last_failure = Some(failure);
                } else {
                    rec.state = TaskState::Failed;
                    rec.last_failure = Some(failure.clone());
                    terminal = Some(failure);
                }
            }

            AttemptOutcome::WorkerLost { silent_for } => {
                rec.worker_losses += 1;
                let failure = ApplyFailure::new(
                    ErrorClass::WorkerLost,
                    format!(
                        "no heartbeat for {:?} ({} worker loss(es))",
                        silent_for, rec.worker_losses
                    ),
                );
                if rec.worker_losses > policy.max_worker_losses {
                    rec.state = TaskState::Failed;
                    rec.last_failure = Some(failure.clone());
                    terminal = Some(failure);
                } else if aborting {
                    rec.state = TaskState::Abandoned;
                    rec.last_failure = Some(failure);
                } else {
                    let again = task.redispatch();
                    warn!(
                        module = %task.module,
                        run_id = task.run_id,
                        worker_losses = rec.worker_losses,
                        "worker lost; redispatching attempt {}",
                        task.attempt
                    );
                    rec.dispatch = again.dispatch;
                    rec.last_failure = Some(failure);
                    commands.push(CoreCommand::DispatchTasks(vec![again]));
                }
            }
        }

        if let Some(failure) = terminal {
            let attempts = rec.attempts;
            error!(
                module = %task.module,
                run_id = task.run_id,
                level = task.level,
                attempts,
                class = %failure.class,
                error = %failure.message,
                "module failed; no further levels will be applied"
            );
            // A module failure outranks an interrupt: it names what broke.
            if matches!(self.abort, None | Some(AbortReason::Interrupted)) {
                self.abort = Some(AbortReason::Failed {
                    module: task.module.clone(),
                    level: task.level,
                    attempts,
                    class: failure.class,
                    message: failure.message,
                });
                self.abandon_pending();
            }
        }

        self.settle(commands)
    }

    pub(super) fn handle_retry_due(&mut self, task: ApplyTask) -> CoreStep {
        if task.level != self.current {
            return CoreStep::idle();
        }
        match self.tasks.get_mut(&task.module) {
            Some(rec) if rec.state == TaskState::Pending && rec.dispatch == task.dispatch => {
                rec.state = TaskState::Running;
                info!(
                    module = %task.module,
                    run_id = task.run_id,
                    attempt = task.attempt,
                    previous = ?rec.last_failure.as_ref().map(|f| f.class),
                    "retrying apply"
                );
                CoreStep::running(vec![CoreCommand::DispatchTasks(vec![task])])
            }
            _ => {
                debug!(module = %task.module, "ignoring retry timer for settled module");
                CoreStep::idle()
            }
        }
    }

    pub(super) fn handle_shutdown(&mut self) -> CoreStep {
        if self.abort.is_none() {
            warn!(
                run_id = self.run_id,
                level = self.current,
                "shutdown requested; waiting for in-flight applies to finish"
            );
            self.abort = Some(AbortReason::Interrupted);
            self.abandon_pending();
        }
        self.settle(Vec::new())
    }

    /// Drop scheduled retries: the run will not continue.
    fn abandon_pending(&mut self) {
        for rec in self.tasks.values_mut() {
            if rec.state == TaskState::Pending {
                rec.state = TaskState::Abandoned;
            }
        }
    }

    /// Append the level transition, if the level has settled.
    fn settle(&mut self, mut commands: Vec<CoreCommand>) -> CoreStep {
        if self.phase == Phase::Running && self.level_settled() {
            let mut next = self.close_level();
            commands.append(&mut next.commands);
            return CoreStep {
                commands,
                keep_running: next.keep_running,
            };
        }
        CoreStep::running(commands)
    }
}
