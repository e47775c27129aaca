//! Dependency graph construction and validation.
//!
//! The graph is built once per run from static unit declarations. An edge
//! exists from unit A to unit B whenever B consumes an output produced by A
//! or names A in `depends_on`. Construction validates the declarations
//! exhaustively so planning never sees an inconsistent graph:
//!
//! - duplicate unit ids
//! - consumed outputs no declared unit produces
//! - producers that never declare the consumed output name
//! - cycles (reported with a deterministic cycle path)

use std::collections::HashMap;

use petgraph::graph::NodeIndex;

use crate::dag::Dag;
use crate::error::{Error, Result};
use crate::unit::{UnitId, UnitSpec};

/// A validated dependency graph over deployable units.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    units: Vec<UnitSpec>,
    index_by_id: HashMap<UnitId, usize>,
    dag: Dag<UnitId>,
}

impl DependencyGraph {
    /// Builds and validates a graph from unit declarations.
    ///
    /// # Errors
    ///
    /// - [`Error::DuplicateUnit`] if two declarations share an id
    /// - [`Error::UnresolvedReference`] if a consumed binding names a
    ///   producer or output no declaration provides
    /// - [`Error::UnitNotFound`] if `depends_on` names an undeclared unit
    /// - [`Error::CycleDetected`] if the induced graph is not acyclic
    #[tracing::instrument(skip(units), fields(unit_count = units.len()))]
    pub fn build(units: Vec<UnitSpec>) -> Result<Self> {
        let index_by_id = index_units_by_id(&units)?;
        validate_bindings(&units, &index_by_id)?;

        let mut dag: Dag<UnitId> = Dag::new();
        let mut node_by_id: HashMap<UnitId, NodeIndex> = HashMap::with_capacity(units.len());
        for unit in &units {
            let idx = dag.add_node(unit.id.clone());
            node_by_id.insert(unit.id.clone(), idx);
        }

        for unit in &units {
            let to = node_by_id[&unit.id];
            for upstream in unit.upstream_units() {
                let from = node_by_id
                    .get(&upstream)
                    .copied()
                    .ok_or_else(|| Error::UnitNotFound {
                        unit: upstream.clone(),
                    })?;
                dag.add_edge(from, to)?;
            }
        }

        // Fail at build time, not planning time.
        dag.topological_layers()?;

        Ok(Self {
            units,
            index_by_id,
            dag,
        })
    }

    /// Returns the number of units in the graph.
    #[must_use]
    pub fn len(&self) -> usize {
        self.units.len()
    }

    /// Returns true if the graph has no units.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Returns all units in declaration order.
    #[must_use]
    pub fn units(&self) -> &[UnitSpec] {
        &self.units
    }

    /// Returns the unit spec for an id.
    #[must_use]
    pub fn unit(&self, id: &UnitId) -> Option<&UnitSpec> {
        self.index_by_id.get(id).map(|&idx| &self.units[idx])
    }

    /// Returns the direct dependencies of a unit, in insertion order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnitNotFound`] if the id is not in the graph.
    pub fn dependencies_of(&self, id: &UnitId) -> Result<Vec<UnitId>> {
        let idx = self
            .dag
            .get_index(id)
            .ok_or_else(|| Error::UnitNotFound { unit: id.clone() })?;
        self.dag.upstream(idx)
    }

    /// Produces successive topological layers of unit ids.
    ///
    /// Each layer contains units whose dependencies all appear in strictly
    /// earlier layers; ties within a layer follow declaration order. The
    /// computation is restartable: each call recomputes from the immutable
    /// graph, so repeated calls yield identical layers.
    ///
    /// # Errors
    ///
    /// Construction already rejected cyclic graphs, so an error here
    /// indicates internal corruption only.
    pub fn topological_layers(&self) -> Result<Vec<Vec<UnitId>>> {
        self.dag.topological_layers()
    }
}

fn index_units_by_id(units: &[UnitSpec]) -> Result<HashMap<UnitId, usize>> {
    let mut index: HashMap<UnitId, usize> = HashMap::with_capacity(units.len());
    for (idx, unit) in units.iter().enumerate() {
        if index.insert(unit.id.clone(), idx).is_some() {
            return Err(Error::DuplicateUnit {
                unit: unit.id.clone(),
            });
        }
    }
    Ok(index)
}

/// Checks that every consumed binding names a declared producer that
/// actually declares the consumed output.
fn validate_bindings(units: &[UnitSpec], index_by_id: &HashMap<UnitId, usize>) -> Result<()> {
    for unit in units {
        for binding in &unit.consumes {
            let producer_idx = index_by_id.get(&binding.producer);
            let declares_output = producer_idx
                .map(|&idx| &units[idx])
                .is_some_and(|producer| producer.produces.contains(&binding.output));

            if !declares_output {
                return Err(Error::UnresolvedReference {
                    unit: unit.id.clone(),
                    producer: binding.producer.clone(),
                    output: binding.output.clone(),
                });
            }
        }

        for dep in &unit.depends_on {
            if !index_by_id.contains_key(dep) {
                return Err(Error::UnitNotFound { unit: dep.clone() });
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layer_and_consumers() -> Vec<UnitSpec> {
        vec![
            UnitSpec::new("auth-layer", "backend").produces("layerArn"),
            UnitSpec::new("cognito", "backend")
                .consumes(("auth-layer", "layerArn"))
                .produces("userPoolId"),
            UnitSpec::new("amplify", "frontend").consumes(("auth-layer", "layerArn")),
        ]
    }

    #[test]
    fn builds_layer_before_consumers() {
        let graph = DependencyGraph::build(layer_and_consumers()).unwrap();
        let layers = graph.topological_layers().unwrap();
        assert_eq!(
            layers,
            vec![
                vec![UnitId::new("auth-layer")],
                vec![UnitId::new("cognito"), UnitId::new("amplify")],
            ]
        );
    }

    #[test]
    fn layers_are_identical_across_calls() {
        let graph = DependencyGraph::build(layer_and_consumers()).unwrap();
        assert_eq!(
            graph.topological_layers().unwrap(),
            graph.topological_layers().unwrap()
        );
    }

    #[test]
    fn duplicate_unit_ids_are_rejected() {
        let units = vec![
            UnitSpec::new("cognito", "backend"),
            UnitSpec::new("cognito", "backend"),
        ];
        assert!(matches!(
            DependencyGraph::build(units),
            Err(Error::DuplicateUnit { .. })
        ));
    }

    #[test]
    fn consuming_an_undeclared_producer_is_rejected() {
        let units = vec![UnitSpec::new("cognito", "backend").consumes(("ghost", "layerArn"))];
        let err = DependencyGraph::build(units).unwrap_err();
        match err {
            Error::UnresolvedReference { unit, producer, .. } => {
                assert_eq!(unit.as_str(), "cognito");
                assert_eq!(producer.as_str(), "ghost");
            }
            other => panic!("expected UnresolvedReference, got {other}"),
        }
    }

    #[test]
    fn consuming_an_undeclared_output_is_rejected() {
        let units = vec![
            UnitSpec::new("auth-layer", "backend").produces("layerArn"),
            UnitSpec::new("cognito", "backend").consumes(("auth-layer", "layerVersion")),
        ];
        let err = DependencyGraph::build(units).unwrap_err();
        assert!(matches!(err, Error::UnresolvedReference { output, .. } if output.as_str() == "layerVersion"));
    }

    #[test]
    fn depends_on_unknown_unit_is_rejected() {
        let units = vec![UnitSpec::new("cognito", "backend").depends_on("ghost")];
        assert!(matches!(
            DependencyGraph::build(units),
            Err(Error::UnitNotFound { .. })
        ));
    }

    #[test]
    fn cycles_are_rejected_at_build() {
        let units = vec![
            UnitSpec::new("a", "backend")
                .produces("out")
                .consumes(("b", "out")),
            UnitSpec::new("b", "backend")
                .produces("out")
                .consumes(("a", "out")),
        ];
        assert!(matches!(
            DependencyGraph::build(units),
            Err(Error::CycleDetected { .. })
        ));
    }

    #[test]
    fn self_consumption_is_a_cycle() {
        let units = vec![UnitSpec::new("a", "backend")
            .produces("out")
            .consumes(("a", "out"))];
        assert!(matches!(
            DependencyGraph::build(units),
            Err(Error::CycleDetected { .. })
        ));
    }

    #[test]
    fn dependencies_of_lists_direct_upstreams() {
        let graph = DependencyGraph::build(layer_and_consumers()).unwrap();
        assert_eq!(
            graph.dependencies_of(&UnitId::new("cognito")).unwrap(),
            vec![UnitId::new("auth-layer")]
        );
        assert!(graph.dependencies_of(&UnitId::new("ghost")).is_err());
    }
}
