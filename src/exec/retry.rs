// src/exec/retry.rs

//! Retry policy with exponential backoff.
//!
//! The same policy type drives two things: the coordinator's per-module
//! retries (one logical attempt at a time, scheduled through the event
//! loop) and [`with_retry`], which wraps the preliminary steps.

use std::collections::BTreeSet;
use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::errors::{InfraflowError, Result};
use crate::types::ErrorClass;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Delay before the first retry.
    pub initial_interval: Duration,
    /// Upper bound on any single delay.
    pub maximum_interval: Duration,
    pub multiplier: f64,
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Classes that are never retried.
    pub non_retryable: BTreeSet<ErrorClass>,
}

impl RetryPolicy {
    /// A policy that makes exactly one attempt.
    pub fn no_retry() -> Self {
        Self {
            initial_interval: Duration::ZERO,
            maximum_interval: Duration::ZERO,
            multiplier: 1.0,
            max_attempts: 1,
            non_retryable: BTreeSet::new(),
        }
    }

    /// Delay before retry number `retry` (0-based):
    /// `min(initial * multiplier^retry, maximum)`.
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let exp = self.multiplier.powi(retry.min(i32::MAX as u32) as i32);
        let secs = self.initial_interval.as_secs_f64() * exp;
        let max = self.maximum_interval.as_secs_f64();
        if !secs.is_finite() || secs >= max {
            return self.maximum_interval;
        }
        Duration::from_secs_f64(secs)
    }

    pub fn is_retryable(&self, class: ErrorClass) -> bool {
        !self.non_retryable.contains(&class)
    }

    /// Whether a failure of `class` after `attempts_made` logical attempts
    /// earns another attempt.
    pub fn should_retry(&self, class: ErrorClass, attempts_made: u32) -> bool {
        self.is_retryable(class) && attempts_made < self.max_attempts
    }
}

/// Run `operation` until it succeeds, each attempt bounded by `timeout`,
/// under `policy`. Every failure is treated as transient.
///
/// Giving up yields [`InfraflowError::Collaborator`] naming `step`.
pub async fn with_retry<T, F, Fut>(
    step: &str,
    policy: &RetryPolicy,
    timeout: Duration,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    let mut last_error = String::from("no attempt made");

    for attempt in 0..policy.max_attempts {
        let err = match tokio::time::timeout(timeout, operation()).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) => format!("{e:#}"),
            Err(_) => format!("timed out after {timeout:?}"),
        };

        if attempt + 1 >= policy.max_attempts {
            last_error = err;
            break;
        }

        let delay = policy.delay_for_retry(attempt);
        warn!(
            step,
            attempt = attempt + 1,
            max_attempts = policy.max_attempts,
            ?delay,
            error = %err,
            "preliminary step failed; retrying"
        );
        tokio::time::sleep(delay).await;
        last_error = err;
    }

    Err(InfraflowError::Collaborator {
        step: step.to_string(),
        message: format!("gave up after {} attempt(s): {}", policy.max_attempts, last_error),
    })
}
