// src/config/validate.rs

use std::collections::BTreeSet;
use std::time::Duration;

use regex::Regex;

use crate::config::duration::parse_duration;
use crate::config::model::{
    ApplySettings, ConfigFile, PreliminarySettings, RawApplySection, RawConfigFile,
    RawPreliminarySection, RawRetrySection, DEFAULT_APPLY_TIMEOUT, DEFAULT_HEARTBEAT_INTERVAL,
    DEFAULT_HEARTBEAT_TIMEOUT, DEFAULT_MAX_WORKER_LOSSES, DEFAULT_PRELIMINARY_TIMEOUT,
    default_apply_command, default_graph_command, default_non_retryable,
    default_validation_patterns,
};
use crate::errors::{InfraflowError, Result};
use crate::exec::retry::RetryPolicy;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = InfraflowError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        if raw.config.infra_dir.trim().is_empty() {
            return Err(InfraflowError::ConfigError(
                "[config].infra_dir must not be empty".to_string(),
            ));
        }
        if let Some(stack) = &raw.config.stack {
            if stack.trim().is_empty() {
                return Err(InfraflowError::ConfigError(
                    "[config].stack must not be empty when set".to_string(),
                ));
            }
        }

        let apply = validate_apply(raw.apply)?;
        let preliminary = validate_preliminary(raw.preliminary)?;

        Ok(ConfigFile {
            config: raw.config,
            apply,
            preliminary,
        })
    }
}

/// Defaults for a retry table that the user may leave partially unset.
struct RetryDefaults {
    initial_interval: &'static str,
    maximum_interval: &'static str,
    multiplier: f64,
    max_attempts: u32,
}

const APPLY_RETRY: RetryDefaults = RetryDefaults {
    initial_interval: "5s",
    maximum_interval: "5m",
    multiplier: 2.0,
    max_attempts: 5,
};

const PRELIMINARY_RETRY: RetryDefaults = RetryDefaults {
    initial_interval: "1s",
    maximum_interval: "10s",
    multiplier: 2.0,
    max_attempts: 3,
};

fn validate_apply(raw: RawApplySection) -> Result<ApplySettings> {
    let timeout = duration_field("apply", "timeout", raw.timeout.as_deref(), DEFAULT_APPLY_TIMEOUT)?;
    let heartbeat_interval = duration_field(
        "apply",
        "heartbeat_interval",
        raw.heartbeat_interval.as_deref(),
        DEFAULT_HEARTBEAT_INTERVAL,
    )?;
    let heartbeat_timeout = duration_field(
        "apply",
        "heartbeat_timeout",
        raw.heartbeat_timeout.as_deref(),
        DEFAULT_HEARTBEAT_TIMEOUT,
    )?;

    if heartbeat_interval >= heartbeat_timeout {
        return Err(InfraflowError::ConfigError(format!(
            "[apply].heartbeat_interval ({heartbeat_interval:?}) must be shorter than heartbeat_timeout ({heartbeat_timeout:?})"
        )));
    }
    if heartbeat_interval >= timeout {
        return Err(InfraflowError::ConfigError(format!(
            "[apply].heartbeat_interval ({heartbeat_interval:?}) must be shorter than timeout ({timeout:?})"
        )));
    }

    let command = command_field("apply", "command", raw.command, default_apply_command)?;

    let validation_patterns = raw
        .validation_patterns
        .unwrap_or_else(default_validation_patterns)
        .iter()
        .map(|p| {
            Regex::new(p).map_err(|e| {
                InfraflowError::ConfigError(format!(
                    "[apply].validation_patterns: invalid regex '{p}': {e}"
                ))
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let non_retryable: BTreeSet<_> = match raw.non_retryable {
        Some(classes) => classes.into_iter().collect(),
        None => default_non_retryable(),
    };

    let retry = validate_retry("apply.retry", &raw.retry, &APPLY_RETRY, non_retryable)?;

    Ok(ApplySettings {
        timeout,
        heartbeat_interval,
        heartbeat_timeout,
        max_worker_losses: raw.max_worker_losses.unwrap_or(DEFAULT_MAX_WORKER_LOSSES),
        command,
        validation_patterns,
        retry,
    })
}

fn validate_preliminary(raw: RawPreliminarySection) -> Result<PreliminarySettings> {
    let timeout = duration_field(
        "preliminary",
        "timeout",
        raw.timeout.as_deref(),
        DEFAULT_PRELIMINARY_TIMEOUT,
    )?;
    let graph_command = command_field(
        "preliminary",
        "graph_command",
        raw.graph_command,
        default_graph_command,
    )?;
    let retry = validate_retry(
        "preliminary.retry",
        &raw.retry,
        &PRELIMINARY_RETRY,
        BTreeSet::new(),
    )?;

    Ok(PreliminarySettings {
        timeout,
        graph_command,
        retry,
    })
}

fn validate_retry(
    section: &str,
    raw: &RawRetrySection,
    defaults: &RetryDefaults,
    non_retryable: BTreeSet<crate::types::ErrorClass>,
) -> Result<RetryPolicy> {
    let initial_interval = duration_field(
        section,
        "initial_interval",
        raw.initial_interval.as_deref(),
        defaults.initial_interval,
    )?;
    let maximum_interval = duration_field(
        section,
        "maximum_interval",
        raw.maximum_interval.as_deref(),
        defaults.maximum_interval,
    )?;
    let multiplier = raw.multiplier.unwrap_or(defaults.multiplier);
    let max_attempts = raw.max_attempts.unwrap_or(defaults.max_attempts);

    if max_attempts == 0 {
        return Err(InfraflowError::ConfigError(format!(
            "[{section}].max_attempts must be >= 1 (got 0)"
        )));
    }
    if !multiplier.is_finite() || multiplier < 1.0 {
        return Err(InfraflowError::ConfigError(format!(
            "[{section}].multiplier must be >= 1.0 (got {multiplier})"
        )));
    }
    if initial_interval > maximum_interval {
        return Err(InfraflowError::ConfigError(format!(
            "[{section}].initial_interval ({initial_interval:?}) exceeds maximum_interval ({maximum_interval:?})"
        )));
    }

    Ok(RetryPolicy {
        initial_interval,
        maximum_interval,
        multiplier,
        max_attempts,
        non_retryable,
    })
}

fn duration_field(
    section: &str,
    key: &str,
    value: Option<&str>,
    default: &str,
) -> Result<Duration> {
    let text = value.unwrap_or(default);
    let d = parse_duration(text)
        .map_err(|e| InfraflowError::ConfigError(format!("[{section}].{key}: {e}")))?;
    if d.is_zero() {
        return Err(InfraflowError::ConfigError(format!(
            "[{section}].{key} must be greater than zero"
        )));
    }
    Ok(d)
}

fn command_field(
    section: &str,
    key: &str,
    value: Option<Vec<String>>,
    default: fn() -> Vec<String>,
) -> Result<Vec<String>> {
    let command = value.unwrap_or_else(default);
    match command.first() {
        Some(program) if !program.trim().is_empty() => Ok(command),
        _ => Err(InfraflowError::ConfigError(format!(
            "[{section}].{key} must name a program"
        ))),
    }
}
