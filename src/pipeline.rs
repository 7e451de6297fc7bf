// src/pipeline.rs

//! The steps of one apply run, from collaborator output to a coordinator
//! result:
//!
//! 1. [`gather_inputs`]: graph text and changed modules, concurrently, each
//!    under the preliminary retry policy.
//! 2. [`plan_run`]: parse, prune to the changed modules and their
//!    dependents, level.
//! 3. [`apply_plan`] / [`apply_plan_until`]: hand the levels to the
//!    coordinator, optionally with a shutdown signal.

use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;

use tracing::info;

use crate::config::PreliminarySettings;
use crate::dag::{DependencyGraph, LevelPlan, parse_dot, plan_levels, prune};
use crate::engine::{Coordinator, CoordinatorCore, CoordinatorEvent, RunReport, next_run_id};
use crate::errors::Result;
use crate::exec::{ApplyBackend, ApplyPolicy, with_retry};
use crate::sources::{ChangeDetector, GraphSource};
use crate::types::{CyclePolicy, ModuleId};

/// Raw inputs of a run.
#[derive(Debug, Clone)]
pub struct RunInputs {
    pub graph: DependencyGraph,
    pub changed: Vec<ModuleId>,
}

/// What a run will apply.
#[derive(Debug, Clone)]
pub struct RunPlan {
    pub changed: Vec<ModuleId>,
    pub pruned: DependencyGraph,
    pub levels: LevelPlan,
}

impl RunPlan {
    pub fn is_empty(&self) -> bool {
        self.pruned.is_empty()
    }
}

/// Fetch the dependency graph of `stack_dir` and the modules changed in
/// `repo` since `base`.
pub async fn gather_inputs(
    graph_source: &dyn GraphSource,
    detector: &dyn ChangeDetector,
    repo: &Path,
    stack_dir: &Path,
    base: &str,
    settings: &PreliminarySettings,
) -> Result<RunInputs> {
    let graph_text = with_retry("dependency graph", &settings.retry, settings.timeout, || {
        graph_source.graph_text(stack_dir)
    });
    let changed = with_retry("change detection", &settings.retry, settings.timeout, || {
        detector.changed_modules(repo, base)
    });

    let (graph_text, changed) = tokio::try_join!(graph_text, changed)?;
    let graph = parse_dot(&graph_text);

    info!(
        nodes = graph.node_count(),
        edges = graph.edge_count(),
        changed = changed.len(),
        "run inputs gathered"
    );
    Ok(RunInputs { graph, changed })
}

/// Prune `graph` to what `changed` affects and level the result.
pub fn plan_run(graph: &DependencyGraph, changed: &[ModuleId], policy: CyclePolicy) -> Result<RunPlan> {
    let pruned = prune(graph, changed);
    let levels = plan_levels(&pruned, policy)?;

    info!(
        modules = pruned.node_count(),
        levels = levels.levels.len(),
        cycle_fallback = levels.cycle_fallback,
        "run planned"
    );
    Ok(RunPlan {
        changed: changed.to_vec(),
        pruned,
        levels,
    })
}

/// Apply `plan` level by level through `backend`.
pub async fn apply_plan<B>(plan: &RunPlan, stack: &str, policy: ApplyPolicy, backend: Arc<B>) -> Result<RunReport>
where
    B: ApplyBackend + 'static,
{
    apply_plan_until(plan, stack, policy, backend, std::future::pending()).await
}

/// Like [`apply_plan`], but once `shutdown` resolves no further attempt is
/// started; in-flight attempts finish and the run ends as interrupted.
pub async fn apply_plan_until<B, S>(
    plan: &RunPlan,
    stack: &str,
    policy: ApplyPolicy,
    backend: Arc<B>,
    shutdown: S,
) -> Result<RunReport>
where
    B: ApplyBackend + 'static,
    S: Future<Output = ()> + Send + 'static,
{
    let core = CoordinatorCore::new(next_run_id(), stack, plan.levels.clone(), policy);
    let coordinator = Coordinator::new(core, backend);

    let tx = coordinator.event_sender();
    let watcher = tokio::spawn(async move {
        shutdown.await;
        let _ = tx.send(CoordinatorEvent::ShutdownRequested).await;
    });

    let result = coordinator.run().await;
    watcher.abort();
    result
}

/// Human-readable level listing for `--dry-run`.
pub fn render_levels(levels: &LevelPlan) -> String {
    let mut out = String::new();
    if levels.levels.is_empty() {
        out.push_str("nothing to apply\n");
        return out;
    }
    let last = levels.levels.len() - 1;
    for (i, level) in levels.levels.iter().enumerate() {
        let names: Vec<&str> = level.iter().map(String::as_str).collect();
        let _ = write!(out, "level {i}: {}", names.join(", "));
        if levels.cycle_fallback && i == last {
            out.push_str("  (cycle: unordered)");
        }
        out.push('\n');
    }
    out
}
