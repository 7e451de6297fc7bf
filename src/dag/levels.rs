// src/dag/levels.rs

//! Dependency-respecting parallel execution order.
//!
//! Kahn-style leveling: each round emits every not-yet-emitted module whose
//! remaining dependency count is zero, then discounts the edges into the
//! modules that depended on that round. Level `i` only contains modules
//! whose dependencies all sit in levels `0..i`.

use std::collections::{BTreeMap, BTreeSet};

use petgraph::algo::tarjan_scc;
use petgraph::graphmap::DiGraphMap;
use tracing::{debug, warn};

use crate::dag::graph::DependencyGraph;
use crate::errors::{InfraflowError, Result};
use crate::types::{CyclePolicy, ModuleId};

/// Modules with no dependency relationship among them.
pub type Level = BTreeSet<ModuleId>;

/// Result of leveling a graph.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LevelPlan {
    pub levels: Vec<Level>,
    /// `true` if the last level is the unordered remainder of a cycle.
    pub cycle_fallback: bool,
}

impl LevelPlan {
    /// Total number of modules across all levels.
    pub fn module_count(&self) -> usize {
        self.levels.iter().map(BTreeSet::len).sum()
    }

    /// Index of the level containing `module`.
    pub fn level_of(&self, module: &str) -> Option<usize> {
        self.levels.iter().position(|l| l.contains(module))
    }
}

/// Best-effort leveling: cycles are flattened into one final level.
///
/// Every node of `graph` appears in exactly one level.
pub fn topological_levels(graph: &DependencyGraph) -> Vec<Level> {
    compute(graph).levels
}

/// Level `graph` under the given cycle policy.
///
/// With [`CyclePolicy::Strict`] a cycle is reported as
/// [`InfraflowError::DagCycle`] naming the modules involved.
pub fn plan_levels(graph: &DependencyGraph, policy: CyclePolicy) -> Result<LevelPlan> {
    let plan = compute(graph);

    if plan.cycle_fallback {
        let stuck = plan.levels.last().cloned().unwrap_or_default();
        let description = describe_cycles(graph, &stuck);
        match policy {
            CyclePolicy::Strict => return Err(InfraflowError::DagCycle(description)),
            CyclePolicy::BestEffort => {
                warn!(
                    modules = stuck.len(),
                    cycles = %description,
                    "dependency cycle detected; applying remaining modules as one unordered level"
                );
            }
        }
    }

    Ok(plan)
}

fn compute(graph: &DependencyGraph) -> LevelPlan {
    let mut in_degree: BTreeMap<&str, usize> = graph
        .nodes()
        .map(|n| (n, graph.dependency_count(n)))
        .collect();

    let mut levels = Vec::new();
    let mut cycle_fallback = false;

    while !in_degree.is_empty() {
        let ready: Vec<&str> = in_degree
            .iter()
            .filter(|(_, deg)| **deg == 0)
            .map(|(name, _)| *name)
            .collect();

        if ready.is_empty() {
            let rest: Level = in_degree.keys().map(|s| s.to_string()).collect();
            debug!(remaining = rest.len(), "no module without pending dependencies left");
            levels.push(rest);
            cycle_fallback = true;
            break;
        }

        for name in &ready {
            in_degree.remove(name);
        }
        for name in &ready {
            for dependent in graph.dependents_of(name) {
                if let Some(deg) = in_degree.get_mut(dependent) {
                    *deg = deg.saturating_sub(1);
                }
            }
        }

        levels.push(ready.into_iter().map(str::to_string).collect());
    }

    LevelPlan {
        levels,
        cycle_fallback,
    }
}

/// Name the strongly connected components among `stuck` that actually form
/// cycles (modules merely downstream of a cycle are left out).
fn describe_cycles(graph: &DependencyGraph, stuck: &Level) -> String {
    let mut sub: DiGraphMap<&str, ()> = DiGraphMap::new();
    for name in stuck {
        sub.add_node(name.as_str());
    }
    for (src, dest) in graph.edges() {
        if stuck.contains(src) && stuck.contains(dest) {
            sub.add_edge(src, dest, ());
        }
    }

    let mut cycles: Vec<Vec<&str>> = tarjan_scc(&sub)
        .into_iter()
        .filter(|scc| scc.len() > 1 || sub.contains_edge(scc[0], scc[0]))
        .map(|mut scc| {
            scc.sort_unstable();
            scc
        })
        .collect();
    cycles.sort();

    cycles
        .iter()
        .map(|scc| format!("[{}]", scc.join(", ")))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::graph::GraphBuilder;

    fn level(names: &[&str]) -> Level {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn linear_chain_yields_one_module_per_level() {
        let g = GraphBuilder::new().with_edge("c", "b").with_edge("b", "a").build();

        assert_eq!(
            topological_levels(&g),
            vec![level(&["a"]), level(&["b"]), level(&["c"])]
        );
    }

    #[test]
    fn independent_modules_share_a_level() {
        let g = GraphBuilder::new()
            .with_edge("C", "A")
            .with_edge("C", "B")
            .with_edge("D", "C")
            .with_edge("E", "C")
            .with_edge("F", "D")
            .with_edge("F", "E")
            .build();

        assert_eq!(
            topological_levels(&g),
            vec![
                level(&["A", "B"]),
                level(&["C"]),
                level(&["D", "E"]),
                level(&["F"])
            ]
        );
    }

    #[test]
    fn no_edges_means_single_level() {
        let g = GraphBuilder::new()
            .with_node("A")
            .with_node("B")
            .with_node("C")
            .build();

        assert_eq!(topological_levels(&g), vec![level(&["A", "B", "C"])]);
    }

    #[test]
    fn empty_graph_has_no_levels() {
        assert!(topological_levels(&DependencyGraph::empty()).is_empty());
    }

    #[test]
    fn pure_cycle_collapses_into_one_level() {
        let g = GraphBuilder::new()
            .with_edge("a", "b")
            .with_edge("b", "c")
            .with_edge("c", "a")
            .build();

        let plan = plan_levels(&g, CyclePolicy::BestEffort).expect("best effort never fails");

        assert_eq!(plan.levels, vec![level(&["a", "b", "c"])]);
        assert!(plan.cycle_fallback);
    }

    #[test]
    fn cycle_downstream_of_acyclic_prefix_keeps_prefix_order() {
        let g = GraphBuilder::new()
            .with_edge("b", "a")
            .with_edge("c", "b")
            .with_edge("b", "c")
            .with_edge("d", "c")
            .build();

        let plan = plan_levels(&g, CyclePolicy::BestEffort).expect("best effort never fails");

        assert_eq!(plan.levels, vec![level(&["a"]), level(&["b", "c", "d"])]);
        assert_eq!(plan.module_count(), 4);
    }

    #[test]
    fn self_edge_triggers_fallback() {
        let g = GraphBuilder::new().with_edge("a", "a").with_node("b").build();

        let plan = plan_levels(&g, CyclePolicy::BestEffort).expect("best effort never fails");

        assert_eq!(plan.levels, vec![level(&["b"]), level(&["a"])]);
        assert!(plan.cycle_fallback);
    }

    #[test]
    fn strict_policy_names_the_cycle_only() {
        let g = GraphBuilder::new()
            .with_edge("b", "a")
            .with_edge("a", "b")
            .with_edge("c", "b")
            .build();

        match plan_levels(&g, CyclePolicy::Strict) {
            Err(InfraflowError::DagCycle(msg)) => assert_eq!(msg, "[a, b]"),
            other => panic!("expected DagCycle, got {other:?}"),
        }
    }

    #[test]
    fn strict_policy_accepts_acyclic_graphs() {
        let g = GraphBuilder::new().with_edge("bootstrap", "cluster").build();

        let plan = plan_levels(&g, CyclePolicy::Strict).expect("acyclic");

        assert_eq!(plan.levels, vec![level(&["cluster"]), level(&["bootstrap"])]);
        assert_eq!(plan.level_of("bootstrap"), Some(1));
        assert!(!plan.cycle_fallback);
    }
}
