//! Wave scheduling: turning a dependency graph into an execution plan.
//!
//! The scheduler partitions the graph's topological layers into stages
//! according to declared grouping hints, derives the waves inside each
//! stage, and attaches approval gates to stage boundaries. For a fixed
//! graph, stage declaration, and gate specification the result is always
//! the same partition with the same ordering inside each wave.

use std::collections::HashMap;

use chrono::Utc;
use convoy_core::PlanId;

use crate::error::{Error, Result};
use crate::graph::DependencyGraph;
use crate::plan::{
    compute_fingerprint, ExecutionPlan, GateSpec, Stage, StageSpec, Wave, MAX_UNITS_PER_PLAN,
};
use crate::unit::UnitId;

/// Name of the implicit stage used when no grouping hints are declared.
const DEFAULT_STAGE_NAME: &str = "deploy";

/// Schedules dependency graphs into staged, gated execution plans.
#[derive(Debug, Default)]
pub struct WaveScheduler;

impl WaveScheduler {
    /// Creates a new scheduler.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Builds an execution plan.
    ///
    /// Every topological layer of the graph becomes one wave, projected
    /// onto the stage that owns its units; stages follow the declared
    /// order. An empty `stage_specs` produces a single implicit stage
    /// containing every unit in declaration order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PlanGeneration`] if:
    /// - the graph exceeds the unit cap
    /// - a declared stage is empty, names an unknown unit, or a unit is
    ///   assigned to zero or multiple stages
    /// - a unit's dependency is assigned to a later stage
    /// - a gate references an out-of-range boundary, the boundary after the
    ///   final stage, a boundary that already has a gate, or reuses a label
    #[tracing::instrument(
        skip(self, graph, stage_specs, gate_specs, stage_name),
        fields(
            unit_count = graph.len(),
            stage_count = stage_specs.len(),
            gate_count = gate_specs.len()
        )
    )]
    pub fn plan(
        &self,
        graph: &DependencyGraph,
        stage_specs: &[StageSpec],
        gate_specs: &[GateSpec],
        stage_name: impl Into<String>,
    ) -> Result<ExecutionPlan> {
        if graph.len() > MAX_UNITS_PER_PLAN {
            return Err(Error::PlanGeneration {
                message: format!(
                    "plan has {} units, exceeding the cap of {MAX_UNITS_PER_PLAN}",
                    graph.len()
                ),
            });
        }

        let specs = default_specs(graph, stage_specs);
        let stage_of = assign_stages(graph, &specs)?;
        validate_stage_ordering(graph, &stage_of)?;

        let layers = graph.topological_layers()?;
        let mut stages: Vec<Stage> = specs
            .iter()
            .enumerate()
            .map(|(stage_idx, spec)| Stage {
                name: spec.name.clone(),
                gate: None,
                waves: project_layers(&layers, &stage_of, stage_idx),
            })
            .collect();

        attach_gates(&mut stages, gate_specs)?;

        let stage_name = stage_name.into();
        let fingerprint = compute_fingerprint(&stage_name, &stages)?;

        Ok(ExecutionPlan {
            plan_id: PlanId::generate(),
            stage_name,
            created_at: Utc::now(),
            fingerprint,
            stages,
        })
    }
}

fn default_specs(graph: &DependencyGraph, stage_specs: &[StageSpec]) -> Vec<StageSpec> {
    if stage_specs.is_empty() {
        vec![StageSpec::new(
            DEFAULT_STAGE_NAME,
            graph.units().iter().map(|u| u.id.clone()).collect(),
        )]
    } else {
        stage_specs.to_vec()
    }
}

/// Maps every unit to the index of the stage that declared it.
fn assign_stages(
    graph: &DependencyGraph,
    specs: &[StageSpec],
) -> Result<HashMap<UnitId, usize>> {
    let mut stage_of: HashMap<UnitId, usize> = HashMap::with_capacity(graph.len());

    for (stage_idx, spec) in specs.iter().enumerate() {
        if spec.units.is_empty() {
            return Err(Error::PlanGeneration {
                message: format!("stage '{}' declares no units", spec.name),
            });
        }
        for unit in &spec.units {
            if graph.unit(unit).is_none() {
                return Err(Error::PlanGeneration {
                    message: format!("stage '{}' names undeclared unit '{unit}'", spec.name),
                });
            }
            if stage_of.insert(unit.clone(), stage_idx).is_some() {
                return Err(Error::PlanGeneration {
                    message: format!("unit '{unit}' is assigned to more than one stage"),
                });
            }
        }
    }

    for unit in graph.units() {
        if !stage_of.contains_key(&unit.id) {
            return Err(Error::PlanGeneration {
                message: format!("unit '{}' is not assigned to any stage", unit.id),
            });
        }
    }

    Ok(stage_of)
}

/// A dependency assigned to a later stage would deadlock the plan; the
/// hints must respect the graph.
fn validate_stage_ordering(
    graph: &DependencyGraph,
    stage_of: &HashMap<UnitId, usize>,
) -> Result<()> {
    for unit in graph.units() {
        let stage = stage_of[&unit.id];
        for upstream in unit.upstream_units() {
            let upstream_stage = stage_of[&upstream];
            if upstream_stage > stage {
                return Err(Error::PlanGeneration {
                    message: format!(
                        "unit '{}' (stage {stage}) depends on '{upstream}' \
                         (stage {upstream_stage}); dependencies must not point \
                         at later stages",
                        unit.id
                    ),
                });
            }
        }
    }
    Ok(())
}

/// Projects the global topological layers onto one stage's members.
///
/// Layer order is preserved, empty projections are dropped. Units sharing a
/// global layer are mutually independent, so each projected wave keeps the
/// intra-wave independence invariant.
fn project_layers(
    layers: &[Vec<UnitId>],
    stage_of: &HashMap<UnitId, usize>,
    stage_idx: usize,
) -> Vec<Wave> {
    layers
        .iter()
        .filter_map(|layer| {
            let units: Vec<UnitId> = layer
                .iter()
                .filter(|unit| stage_of.get(*unit) == Some(&stage_idx))
                .cloned()
                .collect();
            if units.is_empty() {
                None
            } else {
                Some(Wave { units })
            }
        })
        .collect()
}

fn attach_gates(stages: &mut [Stage], gate_specs: &[GateSpec]) -> Result<()> {
    for gate in gate_specs {
        let following = gate.after_stage + 1;
        if gate.after_stage >= stages.len() {
            return Err(Error::PlanGeneration {
                message: format!(
                    "gate '{}' follows stage {}, but the plan has {} stages",
                    gate.label,
                    gate.after_stage,
                    stages.len()
                ),
            });
        }
        if following >= stages.len() {
            return Err(Error::PlanGeneration {
                message: format!(
                    "gate '{}' follows the final stage; there is nothing left to protect",
                    gate.label
                ),
            });
        }
        if stages
            .iter()
            .any(|stage| stage.gate.as_ref() == Some(&gate.label))
        {
            return Err(Error::PlanGeneration {
                message: format!("gate label '{}' is declared twice", gate.label),
            });
        }
        let stage = &mut stages[following];
        if let Some(existing) = &stage.gate {
            return Err(Error::PlanGeneration {
                message: format!(
                    "stage '{}' already gated by '{existing}'; cannot also gate with '{}'",
                    stage.name, gate.label
                ),
            });
        }
        stage.gate = Some(gate.label.clone());
    }
    Ok(())
}
