// src/exec/backend.rs

//! The apply-task boundary.
//!
//! The coordinator never runs the infrastructure tool itself. It hands an
//! [`ApplyTask`] to an [`ApplyBackend`] and waits for a tagged result, while
//! the backend reports liveness through a [`Heartbeat`].
//!
//! - [`crate::exec::terragrunt::TerragruntBackend`] is the production
//!   implementation.
//! - Tests provide their own backend that records dispatches and scripts
//!   outcomes without spawning processes.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use tokio::sync::mpsc;

use crate::exec::task::ApplyTask;
use crate::types::ErrorClass;

/// A failed attempt, classified by the backend that observed it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyFailure {
    pub class: ErrorClass,
    pub message: String,
}

impl ApplyFailure {
    pub fn new(class: ErrorClass, message: impl Into<String>) -> Self {
        Self {
            class,
            message: message.into(),
        }
    }
}

impl fmt::Display for ApplyFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.class, self.message)
    }
}

impl std::error::Error for ApplyFailure {}

pub type ApplyResult = std::result::Result<(), ApplyFailure>;

/// Liveness handle given to a backend for the duration of one attempt.
///
/// Recording a heartbeat never fails; once the supervisor has stopped
/// listening the details are dropped.
#[derive(Debug, Clone)]
pub struct Heartbeat {
    tx: mpsc::UnboundedSender<String>,
}

impl Heartbeat {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Report progress, e.g. the last line of tool output.
    pub fn record(&self, details: impl Into<String>) {
        let _ = self.tx.send(details.into());
    }
}

/// Capability to perform one apply attempt.
///
/// Implementations must heartbeat at least every
/// `task.policy.heartbeat_interval` while the attempt is running, or the
/// supervisor will treat the worker as lost.
pub trait ApplyBackend: Send + Sync {
    fn apply(
        &self,
        task: ApplyTask,
        heartbeat: Heartbeat,
    ) -> Pin<Box<dyn Future<Output = ApplyResult> + Send + '_>>;
}
