//! Deterministic execution planning.
//!
//! Plans are generated from a dependency graph plus declared stage and gate
//! specifications, and represent exactly what will execute. Plans are:
//!
//! - **Deterministic**: Same inputs always produce the same partition
//! - **Serializable**: Can be stored and compared for debugging
//! - **Fingerprinted**: SHA-256 over canonical JSON of the partition, so
//!   two plans from identical inputs are provably identical

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use chrono::{DateTime, Utc};
use convoy_core::canonical_json;
use convoy_core::PlanId;

use crate::error::Result;
use crate::unit::UnitId;

/// Production guardrail: hard cap on units per plan.
pub(crate) const MAX_UNITS_PER_PLAN: usize = 1_000;

/// Label an approval gate is addressed by (e.g. `Promote-To-Prod`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GateLabel(String);

impl GateLabel {
    /// Creates a new gate label.
    #[must_use]
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    /// Returns the label as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GateLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for GateLabel {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for GateLabel {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Declares a manual-approval gate at a stage boundary.
///
/// `after_stage = i` places the gate between stage `i` and stage `i + 1`:
/// no unit in stage `i + 1` starts until approval for `label` is recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GateSpec {
    /// Index of the stage the gate follows.
    pub after_stage: usize,
    /// Approval label the gate waits on.
    pub label: GateLabel,
}

impl GateSpec {
    /// Creates a new gate spec.
    #[must_use]
    pub fn new(after_stage: usize, label: impl Into<GateLabel>) -> Self {
        Self {
            after_stage,
            label: label.into(),
        }
    }
}

/// Declares one stage grouping: a named, ordered set of units that must be
/// stage-isolated from everything that follows.
///
/// Grouping is an explicit operator declaration, never inferred from the
/// dependency graph: the graph alone cannot express constraints like "a
/// shared layer must be fully published before any consumer stage", because
/// updating the artifact in place while consumers pin it is unsafe even
/// though the graph would allow co-scheduling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageSpec {
    /// Stage name (e.g. `backend-layer`, `deploy`).
    pub name: String,
    /// Units assigned to this stage, in declaration order.
    pub units: Vec<UnitId>,
}

impl StageSpec {
    /// Creates a new stage spec.
    #[must_use]
    pub fn new(name: impl Into<String>, units: Vec<UnitId>) -> Self {
        Self {
            name: name.into(),
            units,
        }
    }
}

/// A set of units with no dependency edges among them, eligible to run
/// concurrently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Wave {
    /// Member units, declaration order.
    pub units: Vec<UnitId>,
}

impl Wave {
    /// Returns the number of units in the wave.
    #[must_use]
    pub fn len(&self) -> usize {
        self.units.len()
    }

    /// Returns true if the wave has no units.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

/// An ordered group of waves. Stages execute strictly sequentially.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stage {
    /// Stage name from the declaration.
    pub name: String,
    /// Gate that must be approved before any unit in this stage starts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gate: Option<GateLabel>,
    /// Waves in execution order.
    pub waves: Vec<Wave>,
}

impl Stage {
    /// Returns the number of units across all waves.
    #[must_use]
    pub fn len(&self) -> usize {
        self.waves.iter().map(Wave::len).sum()
    }

    /// Returns true if the stage has no units.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.waves.iter().all(Wave::is_empty)
    }
}

/// A deterministic execution plan: the stage/wave partition of one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionPlan {
    /// Unique plan identifier (one per derivation).
    pub plan_id: PlanId,
    /// Deployment stage name from the build configuration.
    pub stage_name: String,
    /// Plan creation timestamp.
    pub created_at: DateTime<Utc>,
    /// SHA-256 fingerprint of the partition (excludes `plan_id` and
    /// `created_at`, so identical inputs yield identical fingerprints).
    pub fingerprint: String,
    /// Stages in execution order.
    pub stages: Vec<Stage>,
}

impl ExecutionPlan {
    /// Returns the number of units in the plan.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.iter().map(Stage::len).sum()
    }

    /// Returns true if the plan has no units.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.iter().all(Stage::is_empty)
    }

    /// Returns every unit id in execution order.
    #[must_use]
    pub fn unit_ids(&self) -> Vec<UnitId> {
        self.stages
            .iter()
            .flat_map(|stage| stage.waves.iter())
            .flat_map(|wave| wave.units.iter().cloned())
            .collect()
    }
}

/// The fingerprint input: everything that determines execution, nothing
/// that varies between derivations.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FingerprintSpec<'a> {
    stage_name: &'a str,
    stages: &'a [Stage],
}

/// Computes the SHA-256 fingerprint over canonical JSON of the partition.
pub(crate) fn compute_fingerprint(stage_name: &str, stages: &[Stage]) -> Result<String> {
    let spec = FingerprintSpec { stage_name, stages };
    let bytes = canonical_json::to_canonical_bytes(&spec).map_err(convoy_core::Error::from)?;
    let digest = Sha256::digest(&bytes);
    Ok(format!("{digest:x}"))
}
