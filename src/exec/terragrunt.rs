// src/exec/terragrunt.rs

//! Process-backed apply backend.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::process::Stdio;

use anyhow::Context;
use regex::Regex;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info};

use crate::config::ConfigFile;
use crate::exec::backend::{ApplyBackend, ApplyFailure, ApplyResult, Heartbeat};
use crate::exec::task::ApplyTask;
use crate::types::ErrorClass;

/// Runs the configured apply command inside
/// `<repo>/<infra_dir>/<stack>/<module>`.
#[derive(Debug, Clone)]
pub struct TerragruntBackend {
    repo: PathBuf,
    infra_dir: String,
    command: Vec<String>,
    validation_patterns: Vec<Regex>,
}

impl TerragruntBackend {
    pub fn new(
        repo: impl Into<PathBuf>,
        infra_dir: impl Into<String>,
        command: Vec<String>,
        validation_patterns: Vec<Regex>,
    ) -> Self {
        Self {
            repo: repo.into(),
            infra_dir: infra_dir.into(),
            command,
            validation_patterns,
        }
    }

    pub fn from_config(repo: &Path, cfg: &ConfigFile) -> Self {
        Self::new(
            repo,
            cfg.config.infra_dir.clone(),
            cfg.apply.command.clone(),
            cfg.apply.validation_patterns.clone(),
        )
    }

    pub fn module_dir(&self, stack: &str, module: &str) -> PathBuf {
        self.repo.join(&self.infra_dir).join(stack).join(module)
    }

    fn is_validation_output(&self, line: &str) -> bool {
        self.validation_patterns.iter().any(|re| re.is_match(line))
    }

    async fn run(&self, task: &ApplyTask, heartbeat: &Heartbeat) -> ApplyResult {
        let dir = self.module_dir(&task.stack, &task.module);
        let (program, args) = match self.command.split_first() {
            Some(split) => split,
            None => return Err(ApplyFailure::new(ErrorClass::Spawn, "empty apply command")),
        };

        info!(
            module = %task.module,
            run_id = task.run_id,
            attempt = task.attempt,
            dir = %dir.display(),
            "starting apply"
        );
        heartbeat.record(format!("starting apply for {}", task.module));

        let mut child = Command::new(program)
            .args(args)
            .current_dir(&dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("spawning '{}' in {}", program, dir.display()))
            .map_err(|e| ApplyFailure::new(ErrorClass::Spawn, format!("{e:#}")))?;

        let (line_tx, mut lines) = mpsc::channel::<String>(256);
        if let Some(stdout) = child.stdout.take() {
            forward_lines(stdout, line_tx.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            forward_lines(stderr, line_tx.clone());
        }
        drop(line_tx);

        let mut ticker = interval(task.policy.heartbeat_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        let mut last_output = String::new();
        let mut validation_hit = false;

        let status = loop {
            tokio::select! {
                status = child.wait() => break status,
                Some(line) = lines.recv() => {
                    self.observe(task, &line, &mut last_output, &mut validation_hit);
                }
                _ = ticker.tick() => {
                    heartbeat.record(format!("apply in progress for {}: {}", task.module, last_output));
                }
            }
        };

        // Output still buffered after exit can decide the classification.
        while let Some(line) = lines.recv().await {
            self.observe(task, &line, &mut last_output, &mut validation_hit);
        }

        let status = status
            .with_context(|| format!("waiting for apply of '{}'", task.module))
            .map_err(|e| ApplyFailure::new(ErrorClass::Tool, format!("{e:#}")))?;

        if status.success() {
            info!(module = %task.module, run_id = task.run_id, "apply finished");
            return Ok(());
        }

        let class = if validation_hit {
            ErrorClass::Validation
        } else {
            ErrorClass::Tool
        };
        Err(ApplyFailure::new(
            class,
            format!(
                "apply of '{}' exited with {}; last output: {}",
                task.module, status, last_output
            ),
        ))
    }

    fn observe(&self, task: &ApplyTask, line: &str, last_output: &mut String, validation_hit: &mut bool) {
        debug!(module = %task.module, dispatch = task.dispatch, "{}", line);
        if line.trim().is_empty() {
            return;
        }
        if self.is_validation_output(line) {
            *validation_hit = true;
        }
        *last_output = line.trim().to_string();
    }
}

impl ApplyBackend for TerragruntBackend {
    fn apply(
        &self,
        task: ApplyTask,
        heartbeat: Heartbeat,
    ) -> Pin<Box<dyn Future<Output = ApplyResult> + Send + '_>> {
        Box::pin(async move { self.run(&task, &heartbeat).await })
    }
}

/// Consume a child pipe so its buffer never fills, forwarding each line.
fn forward_lines<R>(reader: R, tx: mpsc::Sender<String>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if tx.send(line).await.is_err() {
                break;
            }
        }
    });
}
