//! Directed acyclic graph over deployable units.
//!
//! This module provides the generic DAG used for:
//! - Producer/consumer dependency tracking
//! - Kahn-style layering for wave scheduling
//! - Cycle detection with a reportable cycle path
//!
//! **Note:** This module is internal to `convoy-flow` to preserve freedom to
//! change internals.

use std::collections::{HashMap, VecDeque};
use std::fmt::Display;
use std::hash::Hash;

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;

use crate::error::{Error, Result};

/// A directed acyclic graph with deterministic iteration order.
///
/// All tie-breaking uses node insertion order, so the same sequence of
/// `add_node`/`add_edge` calls always yields the same toposort and the same
/// layer partition.
#[derive(Debug, Clone)]
pub struct Dag<T>
where
    T: Clone + Eq + Hash + Display,
{
    /// The underlying petgraph graph.
    graph: DiGraph<T, ()>,
    /// Map from node value to node index for fast lookup.
    index_map: HashMap<T, NodeIndex>,
    /// Insertion order for deterministic tie-breaking.
    insertion_order: Vec<NodeIndex>,
}

impl<T> Dag<T>
where
    T: Clone + Eq + Hash + Display,
{
    /// Creates a new empty DAG.
    #[must_use]
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            index_map: HashMap::new(),
            insertion_order: Vec::new(),
        }
    }

    /// Returns the number of nodes in the DAG.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Adds a node to the DAG.
    ///
    /// If the node already exists, this is a no-op.
    /// Returns the node index for use with `add_edge`.
    pub fn add_node(&mut self, value: T) -> NodeIndex {
        if let Some(&idx) = self.index_map.get(&value) {
            return idx;
        }
        let idx = self.graph.add_node(value.clone());
        self.index_map.insert(value, idx);
        self.insertion_order.push(idx);
        idx
    }

    /// Adds a directed edge from `from` to `to`.
    ///
    /// # Errors
    ///
    /// Returns an error if either node index is invalid.
    pub fn add_edge(&mut self, from: NodeIndex, to: NodeIndex) -> Result<()> {
        self.graph
            .node_weight(from)
            .ok_or_else(|| Error::DagNodeNotFound {
                node: format!("index {}", from.index()),
            })?;
        self.graph
            .node_weight(to)
            .ok_or_else(|| Error::DagNodeNotFound {
                node: format!("index {}", to.index()),
            })?;

        self.graph.add_edge(from, to, ());
        Ok(())
    }

    /// Returns the node index for a value, if it exists.
    #[must_use]
    pub fn get_index(&self, value: &T) -> Option<NodeIndex> {
        self.index_map.get(value).copied()
    }

    /// Returns successive topological layers.
    ///
    /// Standard Kahn-style layering: repeatedly peel the set of nodes with
    /// in-degree zero, decrement the in-degree of their successors, recurse.
    /// Every node's predecessors land in a strictly earlier layer; ties
    /// within a layer are broken by insertion order.
    ///
    /// The computation restarts from scratch on every call, so repeated
    /// invocations on an unchanged DAG yield identical layers.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CycleDetected`] with a deterministic cycle path if
    /// the graph is not acyclic.
    pub fn topological_layers(&self) -> Result<Vec<Vec<T>>> {
        let node_count = self.graph.node_count();
        if node_count == 0 {
            return Ok(Vec::new());
        }

        let mut in_degree: HashMap<NodeIndex, usize> = HashMap::with_capacity(node_count);
        for idx in self.graph.node_indices() {
            in_degree.insert(idx, 0);
        }
        for edge in self.graph.edge_references() {
            *in_degree.entry(edge.target()).or_insert(0) += 1;
        }

        // Current frontier: zero in-degree nodes, insertion order.
        let mut frontier: Vec<NodeIndex> = self
            .insertion_order
            .iter()
            .filter(|&&idx| in_degree.get(&idx).copied().unwrap_or(0) == 0)
            .copied()
            .collect();

        let mut layers = Vec::new();
        let mut visited = 0usize;

        while !frontier.is_empty() {
            let mut layer = Vec::with_capacity(frontier.len());
            let mut next: Vec<NodeIndex> = Vec::new();

            for &idx in &frontier {
                let node = self
                    .graph
                    .node_weight(idx)
                    .ok_or_else(|| Error::DagNodeNotFound {
                        node: format!("index {}", idx.index()),
                    })?
                    .clone();
                layer.push(node);
                visited += 1;

                for neighbor in self.graph.neighbors_directed(idx, Direction::Outgoing) {
                    if let Some(deg) = in_degree.get_mut(&neighbor) {
                        *deg = deg.saturating_sub(1);
                        if *deg == 0 {
                            next.push(neighbor);
                        }
                    }
                }
            }

            // Keep the next frontier in insertion order regardless of the
            // order edges released its members.
            next.sort_by_key(|n| {
                self.insertion_order
                    .iter()
                    .position(|&i| i == *n)
                    .unwrap_or(usize::MAX)
            });
            next.dedup();

            layers.push(layer);
            frontier = next;
        }

        if visited != node_count {
            return Err(Error::CycleDetected {
                cycle: self.find_cycle_path(&in_degree),
            });
        }

        Ok(layers)
    }

    /// Returns a flat topological order (layers concatenated).
    ///
    /// # Errors
    ///
    /// Returns [`Error::CycleDetected`] if the graph contains a cycle.
    pub fn toposort(&self) -> Result<Vec<T>> {
        Ok(self.topological_layers()?.into_iter().flatten().collect())
    }

    /// Returns the direct predecessors of a node, in insertion order.
    ///
    /// # Errors
    ///
    /// Returns an error if the node index is invalid.
    pub fn upstream(&self, node: NodeIndex) -> Result<Vec<T>> {
        self.graph
            .node_weight(node)
            .ok_or_else(|| Error::DagNodeNotFound {
                node: format!("index {}", node.index()),
            })?;

        let mut neighbors: Vec<NodeIndex> = self
            .graph
            .neighbors_directed(node, Direction::Incoming)
            .collect();

        neighbors.sort_by_key(|n| {
            self.insertion_order
                .iter()
                .position(|&i| i == *n)
                .unwrap_or(usize::MAX)
        });

        Ok(neighbors
            .into_iter()
            .filter_map(|idx| self.graph.node_weight(idx).cloned())
            .collect())
    }

    /// Walks the residual graph (nodes still carrying in-degree after a
    /// failed peel) to produce a deterministic cycle path for reporting.
    fn find_cycle_path(&self, in_degree: &HashMap<NodeIndex, usize>) -> Vec<String> {
        let remaining = |idx: &NodeIndex| in_degree.get(idx).copied().unwrap_or(0) > 0;

        // Start from the first stuck node in insertion order.
        let Some(&start) = self.insertion_order.iter().find(|idx| remaining(idx)) else {
            return vec!["unknown".to_string()];
        };

        let mut path: Vec<NodeIndex> = vec![start];
        let mut current = start;
        loop {
            // Follow the first stuck successor, insertion order.
            let mut successors: Vec<NodeIndex> = self
                .graph
                .neighbors_directed(current, Direction::Outgoing)
                .filter(|idx| remaining(idx))
                .collect();
            successors.sort_by_key(|n| {
                self.insertion_order
                    .iter()
                    .position(|&i| i == *n)
                    .unwrap_or(usize::MAX)
            });

            let Some(&next) = successors.first() else {
                break;
            };

            if let Some(pos) = path.iter().position(|&idx| idx == next) {
                // Close the loop: keep the cycle portion plus the repeat.
                path = path.split_off(pos);
                path.push(next);
                break;
            }
            path.push(next);
            current = next;
        }

        path.iter()
            .filter_map(|idx| self.graph.node_weight(*idx))
            .map(ToString::to_string)
            .collect()
    }
}

impl<T> Default for Dag<T>
where
    T: Clone + Eq + Hash + Display,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_dag_has_no_layers() {
        let dag: Dag<String> = Dag::new();
        assert_eq!(dag.node_count(), 0);
        assert!(dag.topological_layers().unwrap().is_empty());
    }

    #[test]
    fn single_node_is_one_layer() {
        let mut dag: Dag<String> = Dag::new();
        dag.add_node("a".into());
        let layers = dag.topological_layers().unwrap();
        assert_eq!(layers, vec![vec!["a".to_string()]]);
    }

    #[test]
    fn linear_chain_layers_one_per_node() {
        let mut dag: Dag<String> = Dag::new();
        let a = dag.add_node("a".into());
        let b = dag.add_node("b".into());
        let c = dag.add_node("c".into());
        dag.add_edge(a, b).unwrap();
        dag.add_edge(b, c).unwrap();

        let layers = dag.topological_layers().unwrap();
        assert_eq!(
            layers,
            vec![
                vec!["a".to_string()],
                vec!["b".to_string()],
                vec!["c".to_string()],
            ]
        );
    }

    #[test]
    fn diamond_groups_independent_nodes() {
        // a -> b, a -> c, b -> d, c -> d
        let mut dag: Dag<String> = Dag::new();
        let a = dag.add_node("a".into());
        let b = dag.add_node("b".into());
        let c = dag.add_node("c".into());
        let d = dag.add_node("d".into());
        dag.add_edge(a, b).unwrap();
        dag.add_edge(a, c).unwrap();
        dag.add_edge(b, d).unwrap();
        dag.add_edge(c, d).unwrap();

        let layers = dag.topological_layers().unwrap();
        assert_eq!(
            layers,
            vec![
                vec!["a".to_string()],
                vec!["b".to_string(), "c".to_string()],
                vec!["d".to_string()],
            ]
        );
    }

    #[test]
    fn every_predecessor_lands_in_an_earlier_layer() {
        let mut dag: Dag<String> = Dag::new();
        let a = dag.add_node("a".into());
        let b = dag.add_node("b".into());
        let c = dag.add_node("c".into());
        let d = dag.add_node("d".into());
        dag.add_edge(a, c).unwrap();
        dag.add_edge(b, d).unwrap();
        dag.add_edge(c, d).unwrap();

        let layers = dag.topological_layers().unwrap();
        let layer_of = |name: &str| {
            layers
                .iter()
                .position(|layer| layer.iter().any(|n| n == name))
                .unwrap()
        };
        assert!(layer_of("a") < layer_of("c"));
        assert!(layer_of("b") < layer_of("d"));
        assert!(layer_of("c") < layer_of("d"));
    }

    #[test]
    fn layering_is_restartable_and_deterministic() {
        let mut dag: Dag<String> = Dag::new();
        let a = dag.add_node("a".into());
        let b = dag.add_node("b".into());
        let c = dag.add_node("c".into());
        dag.add_edge(a, c).unwrap();
        dag.add_edge(b, c).unwrap();

        let first = dag.topological_layers().unwrap();
        let second = dag.topological_layers().unwrap();
        assert_eq!(first, second);
        assert_eq!(first[0], vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn cycle_is_detected_with_path() {
        let mut dag: Dag<String> = Dag::new();
        let a = dag.add_node("a".into());
        let b = dag.add_node("b".into());
        let c = dag.add_node("c".into());
        dag.add_edge(a, b).unwrap();
        dag.add_edge(b, c).unwrap();
        dag.add_edge(c, a).unwrap();

        let err = dag.topological_layers().unwrap_err();
        match err {
            Error::CycleDetected { cycle } => {
                // Path closes on its starting node.
                assert_eq!(cycle.first(), cycle.last());
                assert!(cycle.len() >= 3);
            }
            other => panic!("expected CycleDetected, got {other}"),
        }
    }

    #[test]
    fn self_edge_is_a_cycle() {
        let mut dag: Dag<String> = Dag::new();
        let a = dag.add_node("a".into());
        dag.add_edge(a, a).unwrap();
        assert!(matches!(
            dag.topological_layers(),
            Err(Error::CycleDetected { .. })
        ));
    }

    #[test]
    fn toposort_flattens_layers() {
        let mut dag: Dag<String> = Dag::new();
        let a = dag.add_node("a".into());
        let b = dag.add_node("b".into());
        dag.add_edge(a, b).unwrap();
        assert_eq!(dag.toposort().unwrap(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn upstream_respects_insertion_order() {
        let mut dag: Dag<String> = Dag::new();
        let a = dag.add_node("a".into());
        let b = dag.add_node("b".into());
        let c = dag.add_node("c".into());
        dag.add_edge(a, c).unwrap();
        dag.add_edge(b, c).unwrap();

        assert_eq!(
            dag.upstream(c).unwrap(),
            vec!["a".to_string(), "b".to_string()]
        );
    }
}
