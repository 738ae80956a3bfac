//! Dependency graph over node names with deterministic topological sort.
//!
//! Edges mean "A must be processed before B". Kahn's algorithm with
//! insertion-order tie-breaking, so nodes without ordering constraints keep
//! their declaration order. A cycle never aborts the sort: the unresolved
//! vertices are appended in insertion order and reported via a warning.

use indexmap::{IndexMap, IndexSet};
use tracing::warn;

/// Directed graph over string node ids.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    /// vertex -> vertices that must be processed after it
    edges: IndexMap<String, IndexSet<String>>,
}

/// Outcome of a topological sort.
///
/// `order` always contains every vertex exactly once. `cycle` lists the
/// vertices that could not be ordered topologically (empty for an acyclic
/// graph); those vertices sit at the end of `order` in insertion order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortResult {
    pub order: Vec<String>,
    pub cycle: Vec<String>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a vertex. A no-op if it is already present.
    pub fn add_node(&mut self, name: &str) {
        self.edges.entry(name.to_string()).or_default();
    }

    /// Record that `before` must be processed before `after`.
    /// Both vertices are registered if missing. Duplicate edges are no-ops.
    pub fn add_edge(&mut self, before: &str, after: &str) {
        self.add_node(after);
        self.edges
            .entry(before.to_string())
            .or_default()
            .insert(after.to_string());
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.edges.contains_key(name)
    }

    /// Topologically sort the graph.
    ///
    /// Repeatedly removes the first in-degree-zero vertex in insertion order.
    /// If removal stalls with vertices remaining, those vertices form a cycle;
    /// they are appended in insertion order and a warning names them. The
    /// returned order always contains every vertex exactly once.
    pub fn sort(&self) -> SortResult {
        let mut in_degree: IndexMap<&str, usize> =
            self.edges.keys().map(|k| (k.as_str(), 0)).collect();
        for targets in self.edges.values() {
            for target in targets {
                if let Some(d) = in_degree.get_mut(target.as_str()) {
                    *d += 1;
                }
            }
        }

        let mut order = Vec::with_capacity(self.edges.len());
        let mut removed: IndexSet<&str> = IndexSet::new();

        loop {
            let next = in_degree
                .iter()
                .find(|(name, &degree)| degree == 0 && !removed.contains(*name))
                .map(|(name, _)| *name);

            let Some(current) = next else { break };
            removed.insert(current);
            order.push(current.to_string());

            if let Some(targets) = self.edges.get(current) {
                for target in targets {
                    if let Some(d) = in_degree.get_mut(target.as_str()) {
                        *d -= 1;
                    }
                }
            }
        }

        let cycle: Vec<String> = self
            .edges
            .keys()
            .filter(|name| !removed.contains(name.as_str()))
            .cloned()
            .collect();

        if !cycle.is_empty() {
            warn!(
                nodes = %cycle.join(", "),
                "dependency cycle detected, affected nodes fall back to declaration order"
            );
            order.extend(cycle.iter().cloned());
        }

        SortResult { order, cycle }
    }
}
