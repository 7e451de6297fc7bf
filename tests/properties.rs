// tests/properties.rs

use std::collections::{BTreeSet, HashMap};

use proptest::prelude::*;

use infraflow::dag::{
    DependencyGraph, GraphBuilder, affected_modules, parse_dot, plan_levels, prune,
    topological_levels, to_dot,
};
use infraflow::types::CyclePolicy;

fn name(i: usize) -> String {
    format!("m{i}")
}

// Acyclic by construction: module N may only depend on modules 0..N-1.
fn dag_strategy(max_nodes: usize) -> impl Strategy<Value = DependencyGraph> {
    (1..=max_nodes).prop_flat_map(|n| {
        proptest::collection::vec(proptest::collection::vec(any::<usize>(), 0..4), n).prop_map(
            move |raw| {
                let mut b = GraphBuilder::new();
                for (i, deps) in raw.into_iter().enumerate() {
                    b.add_node(name(i));
                    if i == 0 {
                        continue;
                    }
                    for d in deps {
                        b.add_edge(name(i), name(d % i));
                    }
                }
                b.build()
            },
        )
    })
}

// Arbitrary edges, cycles and self-loops included.
fn graph_strategy(max_nodes: usize) -> impl Strategy<Value = DependencyGraph> {
    (1..=max_nodes).prop_flat_map(|n| {
        proptest::collection::vec((0..n, 0..n), 0..(n * 2)).prop_map(move |edges| {
            let mut b = GraphBuilder::new();
            for i in 0..n {
                b.add_node(name(i));
            }
            for (s, d) in edges {
                b.add_edge(name(s), name(d));
            }
            b.build()
        })
    })
}

/// Fixed-point reference: seeds, then anything with an edge into the set.
fn reference_closure(g: &DependencyGraph, seeds: &[String]) -> BTreeSet<String> {
    let mut keep: BTreeSet<String> = seeds.iter().filter(|s| g.contains(s)).cloned().collect();
    loop {
        let before = keep.len();
        for (src, dest) in g.edges() {
            if keep.contains(dest) {
                keep.insert(src.to_string());
            }
        }
        if keep.len() == before {
            return keep;
        }
    }
}

proptest! {
    #[test]
    fn prune_keeps_exactly_the_reverse_closure(
        g in graph_strategy(12),
        seeds in proptest::collection::vec(0..15usize, 0..4),
    ) {
        let seeds: Vec<String> = seeds.into_iter().map(name).collect();
        let pruned = prune(&g, &seeds);

        let expected = reference_closure(&g, &seeds);
        let kept: BTreeSet<String> = pruned.get_nodes().into_iter().collect();
        prop_assert_eq!(&kept, &expected);
        prop_assert_eq!(affected_modules(&g, &seeds), expected);
    }

    #[test]
    fn pruned_graph_is_closed_and_induced(
        g in graph_strategy(12),
        seeds in proptest::collection::vec(0..12usize, 1..4),
    ) {
        let seeds: Vec<String> = seeds.into_iter().map(name).collect();
        let pruned = prune(&g, &seeds);

        for kept in pruned.nodes() {
            for dependent in g.dependents_of(kept) {
                prop_assert!(pruned.contains(dependent), "{} depends on kept {} but was dropped", dependent, kept);
            }
        }
        for (src, dest) in g.edges() {
            let both = pruned.contains(src) && pruned.contains(dest);
            prop_assert_eq!(both, pruned.dependencies_of(src).any(|d| d == dest));
        }
    }

    #[test]
    fn leveling_covers_every_node_once(g in graph_strategy(12)) {
        let levels = topological_levels(&g);

        let mut seen = BTreeSet::new();
        for level in &levels {
            prop_assert!(!level.is_empty());
            for m in level {
                prop_assert!(seen.insert(m.clone()), "{} appears twice", m);
            }
        }
        prop_assert_eq!(seen.len(), g.node_count());
    }

    #[test]
    fn dependencies_land_in_strictly_earlier_levels(g in dag_strategy(15)) {
        let plan = plan_levels(&g, CyclePolicy::Strict).expect("generated graphs are acyclic");
        prop_assert!(!plan.cycle_fallback);

        let level_of: HashMap<&str, usize> = plan
            .levels
            .iter()
            .enumerate()
            .flat_map(|(i, l)| l.iter().map(move |m| (m.as_str(), i)))
            .collect();
        for (src, dest) in g.edges() {
            prop_assert!(level_of[dest] < level_of[src], "{} -> {}", src, dest);
        }
    }

    #[test]
    fn serialization_round_trips(
        edges in proptest::collection::vec(("[a-z\"\\\\/ -]{1,8}", "[a-z\"\\\\/ -]{1,8}"), 0..10),
        standalone in proptest::collection::vec("[a-z/_-]{1,8}", 0..4),
    ) {
        let mut b = GraphBuilder::new();
        for (s, d) in &edges {
            b.add_edge(s.as_str(), d.as_str());
        }
        for n in &standalone {
            b.add_node(n.as_str());
        }
        let g = b.build();

        prop_assert_eq!(parse_dot(&to_dot(&g)), g);
    }
}
