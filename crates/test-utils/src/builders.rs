#![allow(dead_code)]

use std::collections::BTreeSet;
use std::time::Duration;

use infraflow::config::{ConfigFile, RawConfigFile};
use infraflow::dag::{DependencyGraph, GraphBuilder};
use infraflow::exec::{ApplyPolicy, RetryPolicy};
use infraflow::types::{CyclePolicy, ErrorClass};

/// Build a graph from `(src, dest)` pairs plus standalone nodes.
pub fn graph(edges: &[(&str, &str)], standalone: &[&str]) -> DependencyGraph {
    let mut b = GraphBuilder::new();
    for (src, dest) in edges {
        b.add_edge(*src, *dest);
    }
    for name in standalone {
        b.add_node(*name);
    }
    b.build()
}

/// Builder for [`ApplyPolicy`] with test-friendly defaults:
/// 60s timeout, 1s heartbeat interval, 3s heartbeat timeout, 3 attempts
/// with 1s..10s backoff, 2 worker losses, `validation` non-retryable.
pub struct ApplyPolicyBuilder {
    policy: ApplyPolicy,
}

impl ApplyPolicyBuilder {
    pub fn new() -> Self {
        Self {
            policy: ApplyPolicy {
                timeout: Duration::from_secs(60),
                heartbeat_interval: Duration::from_secs(1),
                heartbeat_timeout: Duration::from_secs(3),
                retry: RetryPolicy {
                    initial_interval: Duration::from_secs(1),
                    maximum_interval: Duration::from_secs(10),
                    multiplier: 2.0,
                    max_attempts: 3,
                    non_retryable: BTreeSet::from([ErrorClass::Validation]),
                },
                max_worker_losses: 2,
            },
        }
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.policy.retry.max_attempts = n;
        self
    }

    pub fn max_worker_losses(mut self, n: u32) -> Self {
        self.policy.max_worker_losses = n;
        self
    }

    pub fn timeout(mut self, d: Duration) -> Self {
        self.policy.timeout = d;
        self
    }

    pub fn non_retryable(mut self, classes: &[ErrorClass]) -> Self {
        self.policy.retry.non_retryable = classes.iter().copied().collect();
        self
    }

    pub fn build(self) -> ApplyPolicy {
        self.policy
    }
}

impl Default for ApplyPolicyBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for [`ConfigFile`] to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile::default(),
        }
    }

    pub fn with_stack(mut self, stack: &str) -> Self {
        self.config.config.stack = Some(stack.to_string());
        self
    }

    pub fn with_cycle_policy(mut self, policy: CyclePolicy) -> Self {
        self.config.config.cycle_policy = policy;
        self
    }

    pub fn with_graph_command(mut self, command: &[&str]) -> Self {
        self.config.preliminary.graph_command =
            Some(command.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn with_preliminary_attempts(mut self, n: u32) -> Self {
        self.config.preliminary.retry.max_attempts = Some(n);
        self.config.preliminary.retry.initial_interval = Some("10ms".to_string());
        self.config.preliminary.retry.maximum_interval = Some("50ms".to_string());
        self
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}
