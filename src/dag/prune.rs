// src/dag/prune.rs

//! Change-scoped pruning.
//!
//! A changed module matters, and so does everything that (transitively)
//! consumes it. Modules it merely depends on are left out.

use std::collections::BTreeSet;

use tracing::{debug, warn};

use crate::dag::graph::{DependencyGraph, GraphBuilder};
use crate::types::ModuleId;

/// Reduce `graph` to the changed modules plus all of their transitive
/// dependents.
///
/// - Identifiers in `changed` that are not nodes of `graph` are ignored.
/// - An empty change set yields an empty graph.
/// - The result keeps exactly the edges whose endpoints are both kept.
pub fn prune<S: AsRef<str>>(graph: &DependencyGraph, changed: &[S]) -> DependencyGraph {
    let keep = affected_modules(graph, changed);

    let mut builder = GraphBuilder::new();
    for name in &keep {
        builder.add_node(name.clone());
        for dep in graph.dependencies_of(name) {
            if keep.contains(dep) {
                builder.add_edge(name.clone(), dep);
            }
        }
    }

    let pruned = builder.build();
    debug!(
        changed = changed.len(),
        nodes_before = graph.node_count(),
        nodes_after = pruned.node_count(),
        edges_after = pruned.edge_count(),
        "pruned dependency graph"
    );
    pruned
}

/// The set of modules [`prune`] keeps.
pub fn affected_modules<S: AsRef<str>>(graph: &DependencyGraph, changed: &[S]) -> BTreeSet<ModuleId> {
    let mut keep: BTreeSet<ModuleId> = BTreeSet::new();
    let mut stack: Vec<&str> = Vec::new();

    for seed in changed.iter().map(|s| s.as_ref()) {
        if !graph.contains(seed) {
            warn!(module = %seed, "changed module not present in dependency graph; ignoring");
            continue;
        }
        if keep.insert(seed.to_string()) {
            stack.push(seed);
        }
    }

    // Nodes are marked before their dependents are pushed, so cycles
    // terminate.
    while let Some(name) = stack.pop() {
        for dependent in graph.dependents_of(name) {
            if keep.insert(dependent.to_string()) {
                stack.push(dependent);
            }
        }
    }

    keep
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::dot::parse_dot;
    use crate::dag::graph::Edge;

    fn sample() -> DependencyGraph {
        parse_dot(
            r#"
digraph {
	"A" -> "B";
	"B" -> "C";
	"D" -> "B";
	"E" -> "F";
	"C";
	"F";
}
"#,
        )
    }

    fn edges(list: &[(&str, &str)]) -> BTreeSet<Edge> {
        list.iter().map(|(s, d)| Edge::new(*s, *d)).collect()
    }

    #[test]
    fn keeps_changed_module_and_its_dependents() {
        let pruned = prune(&sample(), &["C"]);

        assert_eq!(pruned.get_nodes(), vec!["A", "B", "C", "D"]);
        assert_eq!(
            pruned.edge_set(),
            edges(&[("A", "B"), ("B", "C"), ("D", "B")])
        );
    }

    #[test]
    fn dependencies_of_a_changed_module_are_dropped() {
        let pruned = prune(&sample(), &["B"]);

        assert_eq!(pruned.get_nodes(), vec!["A", "B", "D"]);
        assert_eq!(pruned.edge_set(), edges(&[("A", "B"), ("D", "B")]));
    }

    #[test]
    fn multiple_seeds_union_their_closures() {
        let pruned = prune(&sample(), &["C", "F"]);

        assert_eq!(pruned.node_count(), 6);
        assert_eq!(pruned.edge_count(), 4);
    }

    #[test]
    fn empty_change_set_means_nothing_to_do() {
        let none: [&str; 0] = [];
        let pruned = prune(&sample(), &none);

        assert!(pruned.is_empty());
        assert_eq!(pruned.edge_count(), 0);
    }

    #[test]
    fn unknown_changed_modules_are_ignored() {
        assert!(prune(&sample(), &["Z"]).is_empty());
        assert_eq!(prune(&sample(), &["Z", "F"]).get_nodes(), vec!["E", "F"]);
    }

    #[test]
    fn infra_scenario_excludes_vpc_and_cache() {
        let g = GraphBuilder::new()
            .with_edge("app", "database")
            .with_edge("app", "cache")
            .with_edge("database", "vpc")
            .with_edge("cache", "vpc")
            .build();

        let pruned = prune(&g, &["database"]);

        assert_eq!(pruned.get_nodes(), vec!["app", "database"]);
        assert_eq!(pruned.edge_set(), edges(&[("app", "database")]));
    }

    #[test]
    fn cycles_terminate() {
        let g = GraphBuilder::new()
            .with_edge("a", "b")
            .with_edge("b", "c")
            .with_edge("c", "a")
            .with_edge("x", "a")
            .build();

        let pruned = prune(&g, &["b"]);

        assert_eq!(pruned.get_nodes(), vec!["a", "b", "c", "x"]);
        assert_eq!(pruned.edge_count(), 4);
    }

    #[test]
    fn real_world_cluster_change() {
        let g = parse_dot(
            r#"digraph {
	"bootstrap-va" ;
	"bootstrap-va" -> "cluster-va";
	"cluster-va" ;
	"cluster-va" -> "core";
	"core" ;
	"dems-cluster-identity" ;
	"dems-cluster-identity" -> "cluster-va";
	"pes/keyvault" ;
	"pes/keyvault" -> "core";
	"pes/keyvault" -> "dems-cluster-identity";
	"sage/redis" -> "core";
}"#,
        );

        let pruned = prune(&g, &["cluster-va"]);

        assert_eq!(
            pruned.get_nodes(),
            vec!["bootstrap-va", "cluster-va", "dems-cluster-identity", "pes/keyvault"]
        );
        assert_eq!(
            pruned.edge_set(),
            edges(&[
                ("bootstrap-va", "cluster-va"),
                ("dems-cluster-identity", "cluster-va"),
                ("pes/keyvault", "dems-cluster-identity"),
            ])
        );
    }
}
