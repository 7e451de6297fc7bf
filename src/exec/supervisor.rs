// src/exec/supervisor.rs

//! Supervision of a single apply attempt.
//!
//! The backend future races two clocks:
//! - the start-to-close deadline, after which the attempt is a
//!   [`ErrorClass::Timeout`] failure;
//! - the heartbeat deadline, pushed forward by every heartbeat, after
//!   which the worker is presumed dead.
//!
//! Either way the backend future is dropped, which cancels only this
//! attempt.

use std::time::Duration;

use tokio::time::{Instant, sleep_until};
use tracing::{debug, warn};

use crate::exec::backend::{ApplyBackend, ApplyFailure, Heartbeat};
use crate::exec::task::ApplyTask;
use crate::types::ErrorClass;

/// What the coordinator learns about one dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Succeeded,
    Failed(ApplyFailure),
    /// No heartbeat for longer than the heartbeat timeout.
    WorkerLost { silent_for: Duration },
}

pub async fn supervise<B>(backend: &B, task: ApplyTask) -> AttemptOutcome
where
    B: ApplyBackend + ?Sized,
{
    let policy = task.policy.clone();
    let module = task.module.clone();
    let dispatch = task.dispatch;

    let (heartbeat, mut beats) = Heartbeat::channel();
    let mut attempt = backend.apply(task, heartbeat);

    let started = Instant::now();
    let deadline = started + policy.timeout;
    let mut last_beat = started;
    let mut listening = true;

    loop {
        let silence_deadline = last_beat + policy.heartbeat_timeout;

        tokio::select! {
            biased;

            result = &mut attempt => {
                return match result {
                    Ok(()) => AttemptOutcome::Succeeded,
                    Err(failure) => AttemptOutcome::Failed(failure),
                };
            }

            beat = beats.recv(), if listening => match beat {
                Some(details) => {
                    last_beat = Instant::now();
                    debug!(module = %module, dispatch, details = %details, "heartbeat");
                }
                // Backend dropped its handle; only the clocks remain.
                None => listening = false,
            },

            _ = sleep_until(deadline) => {
                warn!(module = %module, dispatch, timeout = ?policy.timeout, "apply attempt timed out");
                return AttemptOutcome::Failed(ApplyFailure::new(
                    ErrorClass::Timeout,
                    format!("no result within start-to-close timeout of {:?}", policy.timeout),
                ));
            }

            _ = sleep_until(silence_deadline) => {
                let silent_for = last_beat.elapsed();
                warn!(module = %module, dispatch, ?silent_for, "no heartbeat; worker presumed lost");
                return AttemptOutcome::WorkerLost { silent_for };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::backend::ApplyResult;
    use crate::exec::retry::RetryPolicy;
    use crate::exec::task::ApplyPolicy;
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::Arc;

    /// Sleeps `total`, heartbeating every `beat_every` if set, then returns `result`.
    struct Scripted {
        total: Duration,
        beat_every: Option<Duration>,
        result: ApplyResult,
    }

    impl ApplyBackend for Scripted {
        fn apply(
            &self,
            _task: ApplyTask,
            heartbeat: Heartbeat,
        ) -> Pin<Box<dyn Future<Output = ApplyResult> + Send + '_>> {
            Box::pin(async move {
                let end = Instant::now() + self.total;
                if let Some(every) = self.beat_every {
                    while Instant::now() + every < end {
                        tokio::time::sleep(every).await;
                        heartbeat.record("still applying");
                    }
                }
                sleep_until(end).await;
                self.result.clone()
            })
        }
    }

    fn task() -> ApplyTask {
        let policy = ApplyPolicy {
            timeout: Duration::from_secs(60),
            heartbeat_interval: Duration::from_secs(5),
            heartbeat_timeout: Duration::from_secs(10),
            retry: RetryPolicy::no_retry(),
            max_worker_losses: 1,
        };
        ApplyTask::new(1, "local", 0, "db", Arc::new(policy))
    }

    #[tokio::test(start_paused = true)]
    async fn quick_success_needs_no_heartbeat() {
        let backend = Scripted {
            total: Duration::from_secs(3),
            beat_every: None,
            result: Ok(()),
        };

        assert_eq!(supervise(&backend, task()).await, AttemptOutcome::Succeeded);
    }

    #[tokio::test(start_paused = true)]
    async fn long_attempt_survives_while_heartbeating() {
        let backend = Scripted {
            total: Duration::from_secs(45),
            beat_every: Some(Duration::from_secs(5)),
            result: Err(ApplyFailure::new(ErrorClass::Tool, "exit status 1")),
        };

        assert_eq!(
            supervise(&backend, task()).await,
            AttemptOutcome::Failed(ApplyFailure::new(ErrorClass::Tool, "exit status 1"))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn silence_means_worker_lost() {
        let backend = Scripted {
            total: Duration::from_secs(45),
            beat_every: None,
            result: Ok(()),
        };

        match supervise(&backend, task()).await {
            AttemptOutcome::WorkerLost { silent_for } => {
                assert_eq!(silent_for, Duration::from_secs(10))
            }
            other => panic!("expected WorkerLost, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn start_to_close_timeout_is_a_timeout_failure() {
        let backend = Scripted {
            total: Duration::from_secs(600),
            beat_every: Some(Duration::from_secs(5)),
            result: Ok(()),
        };

        match supervise(&backend, task()).await {
            AttemptOutcome::Failed(f) => assert_eq!(f.class, ErrorClass::Timeout),
            other => panic!("expected timeout, got {other:?}"),
        }
    }
}
