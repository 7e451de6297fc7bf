// src/lib.rs

pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod logging;
pub mod pipeline;
pub mod sources;
pub mod types;

use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};

use crate::cli::CliArgs;
use crate::config::loader::load_or_default;
use crate::dag::to_dot;
use crate::engine::RunReport;
use crate::errors::InfraflowError;
use crate::exec::{ApplyPolicy, TerragruntBackend};
use crate::pipeline::{RunPlan, apply_plan_until, gather_inputs, plan_run, render_levels};
use crate::sources::{
    ChangeDetector, CommandGraphSource, FileGraphSource, GitChangeDetector, GraphSource,
    StaticChangeDetector,
};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - graph sourcing and change detection
/// - pruning and leveling
/// - the coordinator with the process-backed apply backend
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let cfg = load_or_default(&args.config)?;

    let stack = cfg
        .stack(args.stack.as_deref())
        .ok_or_else(|| {
            InfraflowError::ConfigError(
                "no stack selected: pass --stack or set [config].stack".to_string(),
            )
        })?
        .to_string();
    let stack_dir = args.repo.join(&cfg.config.infra_dir).join(&stack);

    let graph_source: Box<dyn GraphSource> = match &args.graph_file {
        Some(path) => Box::new(FileGraphSource::new(path)),
        None => Box::new(CommandGraphSource::new(cfg.preliminary.graph_command.clone())),
    };
    let detector: Box<dyn ChangeDetector> = if args.changed.is_empty() {
        Box::new(GitChangeDetector::new(cfg.config.infra_dir.clone()))
    } else {
        Box::new(StaticChangeDetector::new(args.changed.clone()))
    };

    let inputs = gather_inputs(
        graph_source.as_ref(),
        detector.as_ref(),
        &args.repo,
        &stack_dir,
        &args.base,
        &cfg.preliminary,
    )
    .await?;

    let plan = plan_run(
        &inputs.graph,
        &inputs.changed,
        args.cycle_policy(cfg.config.cycle_policy),
    )?;

    if args.dry_run {
        print_dry_run(&stack, &plan);
        return Ok(());
    }

    let backend = Arc::new(TerragruntBackend::from_config(&args.repo, &cfg));

    // Ctrl-C → stop after in-flight applies finish.
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    let report =
        apply_plan_until(&plan, &stack, ApplyPolicy::from(&cfg.apply), backend, ctrl_c).await?;
    log_summary(&report);
    Ok(())
}

fn print_dry_run(stack: &str, plan: &RunPlan) {
    println!("infraflow dry-run (stack {stack})");
    println!("changed: {}", plan.changed.join(", "));
    println!();
    print!("{}", to_dot(&plan.pruned));
    println!();
    print!("{}", render_levels(&plan.levels));
}

fn log_summary(report: &RunReport) {
    info!(
        run_id = report.run_id,
        stack = %report.stack,
        levels = report.levels.len(),
        modules = report.module_count(),
        retries = report.retries(),
        "all affected modules applied"
    );
}
