// tests/coordinator_levels.rs

use std::collections::HashMap;
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use infraflow::dag::{plan_levels, prune};
use infraflow::pipeline::{RunPlan, apply_plan};
use infraflow::types::CyclePolicy;
use infraflow_test_utils::builders::{ApplyPolicyBuilder, graph};
use infraflow_test_utils::fake_backend::{BackendEvent, FakeBackend};
use infraflow_test_utils::{init_tracing, with_timeout_of};

type TestResult = Result<(), Box<dyn Error>>;

fn plan_for(edges: &[(&str, &str)], standalone: &[&str], changed: &[&str]) -> RunPlan {
    let g = graph(edges, standalone);
    let changed: Vec<String> = changed.iter().map(|s| s.to_string()).collect();
    let pruned = prune(&g, &changed);
    let levels = plan_levels(&pruned, CyclePolicy::BestEffort).expect("best effort");
    RunPlan {
        changed,
        pruned,
        levels,
    }
}

/// No module may finish after a module of a later level has started.
fn assert_level_barrier(plan: &RunPlan, events: &[BackendEvent]) {
    let level_of: HashMap<String, usize> = plan
        .levels
        .levels
        .iter()
        .enumerate()
        .flat_map(|(i, l)| l.iter().map(move |m| (m.clone(), i)))
        .collect();

    for (i, event) in events.iter().enumerate() {
        let BackendEvent::Started { module, .. } = event else {
            continue;
        };
        let level = level_of[module];
        for earlier in &events[i..] {
            if let BackendEvent::Finished { module: m, .. } = earlier {
                assert!(
                    level_of[m] >= level,
                    "{module} (level {level}) started before {m} (level {}) finished",
                    level_of[m]
                );
            }
        }
    }
}

#[tokio::test(start_paused = true)]
async fn levels_are_applied_strictly_in_order() -> TestResult {
    init_tracing();

    let plan = plan_for(
        &[
            ("C", "A"),
            ("C", "B"),
            ("D", "C"),
            ("E", "C"),
            ("F", "D"),
            ("F", "E"),
        ],
        &[],
        &["A", "B"],
    );
    let backend = Arc::new(FakeBackend::new().with_work(Duration::from_millis(250)));

    let report = with_timeout_of(
        Duration::from_secs(60),
        apply_plan(&plan, "local", ApplyPolicyBuilder::new().build(), backend.clone()),
    )
    .await?;

    assert_eq!(report.applied_modules(), vec!["A", "B", "C", "D", "E", "F"]);
    assert_eq!(report.levels.len(), 4);
    assert_level_barrier(&plan, &backend.events());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn modules_of_one_level_run_concurrently() -> TestResult {
    init_tracing();

    let plan = plan_for(&[], &["a", "b", "c"], &["a", "b", "c"]);
    let backend = Arc::new(FakeBackend::new().with_work(Duration::from_secs(2)));

    apply_plan(&plan, "local", ApplyPolicyBuilder::new().build(), backend.clone()).await?;

    // All three start before any of them finishes.
    let events = backend.events();
    let first_finish = events
        .iter()
        .position(|e| matches!(e, BackendEvent::Finished { .. }))
        .expect("finishes recorded");
    assert_eq!(first_finish, 3, "{events:?}");
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn only_affected_modules_are_applied() -> TestResult {
    init_tracing();

    let plan = plan_for(
        &[
            ("app", "database"),
            ("app", "cache"),
            ("database", "vpc"),
            ("cache", "vpc"),
        ],
        &[],
        &["database"],
    );
    let backend = Arc::new(FakeBackend::new());

    let report = apply_plan(&plan, "local", ApplyPolicyBuilder::new().build(), backend.clone()).await?;

    assert_eq!(backend.started(), vec!["database", "app"]);
    assert_eq!(report.stack, "local");
    assert_eq!(report.levels[1].modules[0].module, "app");
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn empty_plan_makes_no_apply_calls() -> TestResult {
    init_tracing();

    let plan = plan_for(&[("b", "a")], &[], &[]);
    let backend = Arc::new(FakeBackend::new());

    let report = apply_plan(&plan, "local", ApplyPolicyBuilder::new().build(), backend.clone()).await?;

    assert!(report.levels.is_empty());
    assert!(backend.events().is_empty());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn cycle_remainder_is_applied_as_final_level() -> TestResult {
    init_tracing();

    let plan = plan_for(&[("b", "a"), ("c", "b"), ("b", "c")], &[], &["a"]);
    let backend = Arc::new(FakeBackend::new());

    let report = apply_plan(&plan, "local", ApplyPolicyBuilder::new().build(), backend).await?;

    assert!(report.cycle_fallback);
    assert_eq!(report.applied_modules(), vec!["a", "b", "c"]);
    Ok(())
}
