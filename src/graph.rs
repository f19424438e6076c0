// Copyright (c) 2025 - Cowboy AI, Inc.
//! Dependency Graph
//!
//! Directed acyclic graph of provisioning units. An edge `a → b` means `b`
//! consumes an output `a` publishes. Ordering is deterministic: ties between
//! ready nodes are broken by insertion order, so the same plan always prints
//! and executes the same way.

use std::collections::{HashMap, VecDeque};
use std::fmt::Display;
use std::hash::Hash;

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;

use crate::errors::{ProvisioningError, ProvisioningResult};

/// Directed acyclic dependency graph
#[derive(Debug, Clone)]
pub struct DependencyGraph<T>
where
    T: Clone + Eq + Hash + Display,
{
    graph: DiGraph<T, ()>,
    index_map: HashMap<T, NodeIndex>,
    insertion_order: Vec<NodeIndex>,
}

impl<T> Default for DependencyGraph<T>
where
    T: Clone + Eq + Hash + Display,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> DependencyGraph<T>
where
    T: Clone + Eq + Hash + Display,
{
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            index_map: HashMap::new(),
            insertion_order: Vec::new(),
        }
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn contains(&self, value: &T) -> bool {
        self.index_map.contains_key(value)
    }

    /// Add a node; no-op if it already exists
    pub fn add_node(&mut self, value: T) -> NodeIndex {
        if let Some(&idx) = self.index_map.get(&value) {
            return idx;
        }
        let idx = self.graph.add_node(value.clone());
        self.index_map.insert(value, idx);
        self.insertion_order.push(idx);
        idx
    }

    /// Add an edge from producer to consumer
    ///
    /// Both nodes must already exist.
    pub fn add_dependency(&mut self, producer: &T, consumer: &T) -> ProvisioningResult<()> {
        let from = self.index_of(producer)?;
        let to = self.index_of(consumer)?;
        self.graph.update_edge(from, to, ());
        Ok(())
    }

    fn index_of(&self, value: &T) -> ProvisioningResult<NodeIndex> {
        self.index_map.get(value).copied().ok_or_else(|| {
            ProvisioningError::Configuration(format!("unknown unit '{}' in dependency graph", value))
        })
    }

    fn position(&self, idx: NodeIndex) -> usize {
        self.insertion_order
            .iter()
            .position(|&i| i == idx)
            .unwrap_or(usize::MAX)
    }

    fn weights(&self, mut indices: Vec<NodeIndex>) -> Vec<T> {
        indices.sort_by_key(|idx| self.position(*idx));
        indices
            .into_iter()
            .filter_map(|idx| self.graph.node_weight(idx).cloned())
            .collect()
    }

    /// Topological order using Kahn's algorithm
    pub fn toposort(&self) -> ProvisioningResult<Vec<T>> {
        let node_count = self.graph.node_count();

        let mut in_degree: HashMap<NodeIndex, usize> = self
            .graph
            .node_indices()
            .map(|idx| (idx, 0))
            .collect();
        for edge in self.graph.edge_references() {
            *in_degree.entry(edge.target()).or_insert(0) += 1;
        }

        let mut queue: VecDeque<NodeIndex> = self
            .insertion_order
            .iter()
            .filter(|idx| in_degree.get(idx).copied().unwrap_or(0) == 0)
            .copied()
            .collect();

        let mut result = Vec::with_capacity(node_count);
        while let Some(idx) = queue.pop_front() {
            if let Some(node) = self.graph.node_weight(idx) {
                result.push(node.clone());
            }

            let mut neighbors: Vec<NodeIndex> = self
                .graph
                .neighbors_directed(idx, Direction::Outgoing)
                .collect();
            neighbors.sort_by_key(|n| self.position(*n));

            for neighbor in neighbors {
                if let Some(deg) = in_degree.get_mut(&neighbor) {
                    *deg = deg.saturating_sub(1);
                    if *deg == 0 {
                        queue.push_back(neighbor);
                    }
                }
            }
        }

        if result.len() != node_count {
            let cycle_node = self
                .insertion_order
                .iter()
                .find(|idx| in_degree.get(idx).copied().unwrap_or(0) > 0)
                .and_then(|&idx| self.graph.node_weight(idx))
                .map_or_else(|| "unknown".to_string(), ToString::to_string);
            return Err(ProvisioningError::CycleDetected(cycle_node));
        }

        Ok(result)
    }

    /// Direct producers of `value`, in insertion order
    pub fn dependencies(&self, value: &T) -> ProvisioningResult<Vec<T>> {
        let idx = self.index_of(value)?;
        Ok(self.weights(
            self.graph
                .neighbors_directed(idx, Direction::Incoming)
                .collect(),
        ))
    }

    /// Direct consumers of `value`, in insertion order
    pub fn dependents(&self, value: &T) -> ProvisioningResult<Vec<T>> {
        let idx = self.index_of(value)?;
        Ok(self.weights(
            self.graph
                .neighbors_directed(idx, Direction::Outgoing)
                .collect(),
        ))
    }

    /// Every node reachable downstream of `value`, in insertion order
    pub fn transitive_dependents(&self, value: &T) -> ProvisioningResult<Vec<T>> {
        let start = self.index_of(value)?;
        let mut seen = vec![start];
        let mut queue = VecDeque::from([start]);
        while let Some(idx) = queue.pop_front() {
            for next in self.graph.neighbors_directed(idx, Direction::Outgoing) {
                if !seen.contains(&next) {
                    seen.push(next);
                    queue.push_back(next);
                }
            }
        }
        seen.retain(|idx| *idx != start);
        Ok(self.weights(seen))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn graph(edges: &[(&str, &str)], nodes: &[&str]) -> DependencyGraph<String> {
        let mut dag = DependencyGraph::new();
        for node in nodes {
            dag.add_node(node.to_string());
        }
        for (from, to) in edges {
            dag.add_dependency(&from.to_string(), &to.to_string()).unwrap();
        }
        dag
    }

    #[test]
    fn test_toposort_respects_edges_and_insertion_order() {
        let dag = graph(
            &[
                ("network", "service:cosmos"),
                ("network", "service:search"),
                ("network", "compute"),
                ("compute", "discovery"),
            ],
            &["network", "service:cosmos", "service:search", "compute", "discovery"],
        );
        assert_eq!(
            dag.toposort().unwrap(),
            vec!["network", "service:cosmos", "service:search", "compute", "discovery"]
        );
    }

    #[test]
    fn test_cycle_is_detected() {
        let dag = graph(&[("a", "b"), ("b", "a")], &["a", "b"]);
        assert!(matches!(
            dag.toposort(),
            Err(ProvisioningError::CycleDetected(node)) if node == "a"
        ));
    }

    #[test]
    fn test_queries() {
        let dag = graph(
            &[("network", "zone"), ("zone", "service"), ("network", "service")],
            &["network", "zone", "service"],
        );
        assert_eq!(dag.dependencies(&"service".to_string()).unwrap(), vec!["network", "zone"]);
        assert_eq!(dag.dependents(&"network".to_string()).unwrap(), vec!["zone", "service"]);
        assert_eq!(
            dag.transitive_dependents(&"zone".to_string()).unwrap(),
            vec!["service"]
        );
    }

    #[test]
    fn test_unknown_node_is_rejected() {
        let mut dag = graph(&[], &["a"]);
        assert!(dag.add_dependency(&"a".to_string(), &"b".to_string()).is_err());
    }
}
