// src/engine/mod.rs

//! Execution coordinator.
//!
//! Applies the levels of a [`crate::dag::LevelPlan`] one at a time, with
//! every module of a level applied concurrently. The pure state machine
//! lives in [`core`] (with its handlers in [`event_handlers`]); the async
//! shell that spawns supervised attempts and retry timers is in
//! [`runtime`].

use std::sync::atomic::{AtomicU64, Ordering};

use crate::exec::{ApplyTask, AttemptOutcome};

/// Events flowing into the coordinator from attempts and timers.
#[derive(Debug, Clone)]
pub enum CoordinatorEvent {
    /// A supervised attempt came back.
    AttemptFinished {
        task: ApplyTask,
        outcome: AttemptOutcome,
    },
    /// The backoff for a scheduled retry has elapsed.
    RetryDue { task: ApplyTask },
    /// Graceful shutdown requested (e.g. Ctrl-C).
    ShutdownRequested,
}

static NEXT_RUN_ID: AtomicU64 = AtomicU64::new(1);

/// Allocate a process-unique, increasing run id.
pub fn next_run_id() -> u64 {
    NEXT_RUN_ID.fetch_add(1, Ordering::Relaxed)
}

pub mod core;
pub mod event_handlers;
pub mod report;
pub mod runtime;
pub mod task_state;

pub use self::core::CoordinatorCore;
pub use event_handlers::{CoreCommand, CoreStep};
pub use report::{LevelReport, ModuleReport, RunReport};
pub use runtime::Coordinator;
pub use task_state::TaskState;
