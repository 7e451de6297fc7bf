// src/dag/graph.rs

use std::collections::{BTreeMap, BTreeSet};

use crate::types::ModuleId;

/// A single dependency: `src` depends on `dest`, so `dest` is applied first.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Edge {
    pub src: ModuleId,
    pub dest: ModuleId,
}

impl Edge {
    pub fn new(src: impl Into<ModuleId>, dest: impl Into<ModuleId>) -> Self {
        Self {
            src: src.into(),
            dest: dest.into(),
        }
    }
}

/// Internal node structure: stores immediate deps and dependents.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct DagNode {
    /// Modules this one depends on (must be applied before it).
    deps: BTreeSet<ModuleId>,
    /// Modules that depend on this one.
    dependents: BTreeSet<ModuleId>,
}

/// Owned, mutable builder for a [`DependencyGraph`].
///
/// `add_node` and `add_edge` are idempotent; adding an edge implicitly adds
/// both endpoints. Call [`GraphBuilder::build`] to freeze the result.
#[derive(Debug, Clone, Default)]
pub struct GraphBuilder {
    nodes: BTreeMap<ModuleId, DagNode>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, name: impl Into<ModuleId>) -> &mut Self {
        self.nodes.entry(name.into()).or_default();
        self
    }

    /// Record that `src` depends on `dest`.
    pub fn add_edge(&mut self, src: impl Into<ModuleId>, dest: impl Into<ModuleId>) -> &mut Self {
        let src = src.into();
        let dest = dest.into();

        self.nodes
            .entry(src.clone())
            .or_default()
            .deps
            .insert(dest.clone());
        self.nodes.entry(dest).or_default().dependents.insert(src);
        self
    }

    /// By-value variant of [`GraphBuilder::add_node`] for chaining.
    pub fn with_node(mut self, name: impl Into<ModuleId>) -> Self {
        self.add_node(name);
        self
    }

    /// By-value variant of [`GraphBuilder::add_edge`] for chaining.
    pub fn with_edge(mut self, src: impl Into<ModuleId>, dest: impl Into<ModuleId>) -> Self {
        self.add_edge(src, dest);
        self
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn build(self) -> DependencyGraph {
        DependencyGraph { nodes: self.nodes }
    }
}

/// Immutable module dependency graph.
///
/// Produced by [`GraphBuilder::build`], [`crate::dag::parse_dot`] or
/// [`crate::dag::prune`]. Nothing mutates a graph after construction, so a
/// single value can be shared freely between the pruner, the leveler and
/// the coordinator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyGraph {
    nodes: BTreeMap<ModuleId, DagNode>,
}

impl DependencyGraph {
    /// The graph with no nodes.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn builder() -> GraphBuilder {
        GraphBuilder::new()
    }

    /// Copy this graph into a fresh builder so it can be extended.
    pub fn to_builder(&self) -> GraphBuilder {
        GraphBuilder {
            nodes: self.nodes.clone(),
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of distinct `(src, dest)` pairs.
    pub fn edge_count(&self) -> usize {
        self.nodes.values().map(|n| n.deps.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    /// All module names. Order is not part of the contract; callers that
    /// need a stable order must sort.
    pub fn nodes(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(|s| s.as_str())
    }

    /// Owned copy of [`DependencyGraph::nodes`].
    pub fn get_nodes(&self) -> Vec<ModuleId> {
        self.nodes.keys().cloned().collect()
    }

    /// Every dependency as `(src, dest)`.
    pub fn edges(&self) -> impl Iterator<Item = (&str, &str)> {
        self.nodes
            .iter()
            .flat_map(|(src, node)| node.deps.iter().map(move |dest| (src.as_str(), dest.as_str())))
    }

    /// Owned set of edges, convenient for comparisons.
    pub fn edge_set(&self) -> BTreeSet<Edge> {
        self.edges().map(|(s, d)| Edge::new(s, d)).collect()
    }

    /// Immediate dependencies of a module (modules it must wait for).
    pub fn dependencies_of(&self, name: &str) -> impl Iterator<Item = &str> {
        self.nodes
            .get(name)
            .into_iter()
            .flat_map(|n| n.deps.iter().map(|s| s.as_str()))
    }

    /// Immediate dependents of a module (modules that wait for it).
    pub fn dependents_of(&self, name: &str) -> impl Iterator<Item = &str> {
        self.nodes
            .get(name)
            .into_iter()
            .flat_map(|n| n.dependents.iter().map(|s| s.as_str()))
    }

    /// Number of distinct dependencies of `name` (0 for unknown modules).
    pub fn dependency_count(&self, name: &str) -> usize {
        self.nodes.get(name).map(|n| n.deps.len()).unwrap_or(0)
    }

    /// Whether `name` takes part in at least one edge.
    pub fn has_edges(&self, name: &str) -> bool {
        self.nodes
            .get(name)
            .map(|n| !n.deps.is_empty() || !n.dependents.is_empty())
            .unwrap_or(false)
    }
}
