// src/engine/core.rs

//! Pure coordinator state machine.
//!
//! The core consumes [`CoordinatorEvent`]s and produces [`CoreCommand`]s
//! describing what the async shell (`engine::runtime::Coordinator`) should
//! do next: dispatch attempts, arm retry timers, or stop.
//!
//! It owns no channels, timers or processes, so every ordering and retry
//! rule can be unit tested synchronously.
//!
//! Levels are applied strictly one after another: the tasks of level `i+1`
//! are only produced once every task of level `i` has reached a terminal
//! state. A terminal failure stops the run after the current level settles.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::info;

use crate::dag::{Level, LevelPlan};
use crate::engine::event_handlers::{CoreCommand, CoreStep};
use crate::engine::report::{LevelReport, ModuleReport, RunReport};
use crate::engine::task_state::{TaskRecord, TaskState};
use crate::engine::CoordinatorEvent;
use crate::errors::{InfraflowError, Result};
use crate::exec::{ApplyPolicy, ApplyTask};
use crate::types::{ErrorClass, ModuleId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Phase {
    NotStarted,
    Running,
    Finished,
}

/// Why the run stops short of the last level.
#[derive(Debug, Clone)]
pub(super) enum AbortReason {
    Failed {
        module: ModuleId,
        level: usize,
        attempts: u32,
        class: ErrorClass,
        message: String,
    },
    Interrupted,
}

#[derive(Debug)]
pub struct CoordinatorCore {
    pub(super) run_id: u64,
    pub(super) stack: String,
    pub(super) levels: Vec<Level>,
    pub(super) cycle_fallback: bool,
    pub(super) policy: Arc<ApplyPolicy>,
    pub(super) phase: Phase,
    /// Index of the level in progress.
    pub(super) current: usize,
    /// Modules of the current level.
    pub(super) tasks: BTreeMap<ModuleId, TaskRecord>,
    pub(super) completed: Vec<LevelReport>,
    pub(super) abort: Option<AbortReason>,
}

impl CoordinatorCore {
    pub fn new(run_id: u64, stack: impl Into<String>, plan: LevelPlan, policy: ApplyPolicy) -> Self {
        Self {
            run_id,
            stack: stack.into(),
            levels: plan.levels,
            cycle_fallback: plan.cycle_fallback,
            policy: Arc::new(policy),
            phase: Phase::NotStarted,
            current: 0,
            tasks: BTreeMap::new(),
            completed: Vec::new(),
            abort: None,
        }
    }

    pub fn run_id(&self) -> u64 {
        self.run_id
    }

    /// Begin the run: dispatch level 0, or finish at once if there is
    /// nothing to apply.
    pub fn start(&mut self) -> CoreStep {
        if self.phase != Phase::NotStarted {
            return CoreStep::idle();
        }
        self.phase = Phase::Running;
        info!(
            run_id = self.run_id,
            stack = %self.stack,
            levels = self.levels.len(),
            "apply run started"
        );
        self.advance()
    }

    /// Handle a single event, returning the commands for the shell.
    pub fn step(&mut self, event: CoordinatorEvent) -> CoreStep {
        if self.phase != Phase::Running {
            return CoreStep::stopped();
        }
        match event {
            CoordinatorEvent::AttemptFinished { task, outcome } => {
                self.handle_attempt_finished(task, outcome)
            }
            CoordinatorEvent::RetryDue { task } => self.handle_retry_due(task),
            CoordinatorEvent::ShutdownRequested => self.handle_shutdown(),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.phase == Phase::Finished
    }

    /// Index of the level in progress, if the run is active.
    pub fn current_level(&self) -> Option<usize> {
        (self.phase == Phase::Running).then_some(self.current)
    }

    /// State of `module` within the current level.
    pub fn state_of(&self, module: &str) -> Option<TaskState> {
        self.tasks.get(module).map(|r| r.state)
    }

    /// Final result, once the shell has stopped.
    pub fn into_result(self) -> Result<RunReport> {
        match self.abort {
            Some(AbortReason::Failed {
                module,
                level,
                attempts,
                class,
                message,
            }) => Err(InfraflowError::ApplyFailed {
                module,
                level,
                attempts,
                class,
                message,
            }),
            Some(AbortReason::Interrupted) => Err(InfraflowError::Interrupted {
                run_id: self.run_id,
            }),
            None => Ok(RunReport {
                run_id: self.run_id,
                stack: self.stack,
                levels: self.completed,
                cycle_fallback: self.cycle_fallback,
            }),
        }
    }

    /// Move to the next non-empty level, or finish.
    pub(super) fn advance(&mut self) -> CoreStep {
        loop {
            if self.abort.is_some() || self.current >= self.levels.len() {
                return self.finish();
            }
            if self.levels[self.current].is_empty() {
                self.current += 1;
                continue;
            }
            break;
        }

        let level = &self.levels[self.current];
        self.tasks = level
            .iter()
            .map(|m| (m.clone(), TaskRecord::dispatched()))
            .collect();
        let tasks: Vec<ApplyTask> = level
            .iter()
            .map(|m| ApplyTask::new(self.run_id, &self.stack, self.current, m, self.policy.clone()))
            .collect();

        info!(
            run_id = self.run_id,
            level = self.current,
            modules = tasks.len(),
            "dispatching level"
        );
        CoreStep::running(vec![CoreCommand::DispatchTasks(tasks)])
    }

    /// Every module of the current level is terminal.
    pub(super) fn level_settled(&self) -> bool {
        self.tasks.values().all(|r| r.state.is_terminal())
    }

    /// Record the settled level and move on.
    pub(super) fn close_level(&mut self) -> CoreStep {
        if self.abort.is_none() {
            let modules = self
                .tasks
                .iter()
                .map(|(module, r)| ModuleReport {
                    module: module.clone(),
                    attempts: r.attempts,
                    worker_losses: r.worker_losses,
                })
                .collect();
            self.completed.push(LevelReport {
                index: self.current,
                modules,
            });
            info!(run_id = self.run_id, level = self.current, "level applied");
        }
        self.current += 1;
        self.advance()
    }

    fn finish(&mut self) -> CoreStep {
        self.phase = Phase::Finished;
        match &self.abort {
            None => info!(
                run_id = self.run_id,
                levels = self.completed.len(),
                "apply run finished"
            ),
            Some(reason) => info!(
                run_id = self.run_id,
                levels_applied = self.completed.len(),
                ?reason,
                "apply run aborted"
            ),
        }
        CoreStep {
            commands: vec![CoreCommand::Finish],
            keep_running: false,
        }
    }
}
