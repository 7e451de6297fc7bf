// src/engine/runtime.rs

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::errors::{InfraflowError, Result};
use crate::exec::{ApplyBackend, ApplyTask, supervise};

use super::core::CoordinatorCore;
use super::report::RunReport;
use super::{CoreCommand, CoreStep, CoordinatorEvent};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Async shell around [`CoordinatorCore`].
///
/// Every attempt runs on its own Tokio task under
/// [`crate::exec::supervise`]; its outcome and every retry timer come back
/// as [`CoordinatorEvent`]s on a single channel, so the core sees one event
/// at a time.
pub struct Coordinator<B: ApplyBackend + 'static> {
    core: CoordinatorCore,
    backend: Arc<B>,
    event_tx: mpsc::Sender<CoordinatorEvent>,
    event_rx: mpsc::Receiver<CoordinatorEvent>,
}

impl<B: ApplyBackend + 'static> fmt::Debug for Coordinator<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Coordinator")
            .field("core", &self.core)
            .finish_non_exhaustive()
    }
}

impl<B: ApplyBackend + 'static> Coordinator<B> {
    pub fn new(core: CoordinatorCore, backend: Arc<B>) -> Self {
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            core,
            backend,
            event_tx,
            event_rx,
        }
    }

    /// Sender for injecting events, e.g. `ShutdownRequested` from a
    /// Ctrl-C handler.
    pub fn event_sender(&self) -> mpsc::Sender<CoordinatorEvent> {
        self.event_tx.clone()
    }

    /// Apply every level and report the outcome.
    pub async fn run(mut self) -> Result<RunReport> {
        let run_id = self.core.run_id();
        let step = self.core.start();
        let mut keep_running = self.execute(step);

        while keep_running {
            let event = self
                .event_rx
                .recv()
                .await
                .ok_or(InfraflowError::ChannelClosed)?;

            debug!(run_id, event = %describe(&event), "coordinator received event");

            let step = self.core.step(event);
            keep_running = self.execute(step);
        }

        info!(run_id, "coordinator exiting");
        self.core.into_result()
    }

    fn execute(&self, step: CoreStep) -> bool {
        for command in step.commands {
            match command {
                CoreCommand::DispatchTasks(tasks) => {
                    for task in tasks {
                        self.spawn_attempt(task);
                    }
                }
                CoreCommand::ScheduleRetry { task, delay } => {
                    let tx = self.event_tx.clone();
                    tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        let _ = tx.send(CoordinatorEvent::RetryDue { task }).await;
                    });
                }
                CoreCommand::Finish => debug!("core finished the run"),
            }
        }
        step.keep_running
    }

    fn spawn_attempt(&self, task: ApplyTask) {
        debug!(
            task_id = %task.task_id,
            run_id = task.run_id,
            attempt = task.attempt,
            dispatch = task.dispatch,
            "dispatching apply attempt"
        );

        let backend = self.backend.clone();
        let tx = self.event_tx.clone();
        tokio::spawn(async move {
            let outcome = supervise(backend.as_ref(), task.clone()).await;
            // The run may already be over; nobody is listening then.
            let _ = tx
                .send(CoordinatorEvent::AttemptFinished { task, outcome })
                .await;
        });
    }
}

fn describe(event: &CoordinatorEvent) -> String {
    match event {
        CoordinatorEvent::AttemptFinished { task, outcome } => {
            format!("{} dispatch {}: {:?}", task.module, task.dispatch, outcome)
        }
        CoordinatorEvent::RetryDue { task } => {
            format!("{} retry due (attempt {})", task.module, task.attempt)
        }
        CoordinatorEvent::ShutdownRequested => "shutdown requested".to_string(),
    }
}
