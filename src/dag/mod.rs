// src/dag/mod.rs

//! Module dependency graph, pruning and leveling.
//!
//! - [`graph`] holds the immutable [`DependencyGraph`] and its [`GraphBuilder`].
//! - [`dot`] reads and writes the planner's `digraph` text format.
//! - [`prune`] reduces a graph to the modules affected by a change set.
//! - [`levels`] groups a graph into dependency-ordered parallel levels.

pub mod dot;
pub mod graph;
pub mod levels;
pub mod prune;

pub use dot::{parse_dot, parse_dot_reader, to_dot};
pub use graph::{DependencyGraph, Edge, GraphBuilder};
pub use levels::{plan_levels, topological_levels, Level, LevelPlan};
pub use prune::{affected_modules, prune};
