//! Orchestration run tracking.
//!
//! A run represents a single end-to-end execution of a deployment plan,
//! capturing:
//!
//! - **State**: The orchestration state machine, from configuration
//!   resolution through terminal success or failure
//! - **Unit progress**: Per-unit execution state and recorded outputs
//! - **Timing**: When the run started executing and when it completed
//!
//! Completed units' outputs are never discarded: a failed run still carries
//! every output recorded before the failure, because rollback is an
//! explicit, separate operation outside this core.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use convoy_core::RunId;

use crate::error::{Error, Result};
use crate::plan::ExecutionPlan;
use crate::unit::{UnitError, UnitExecution, UnitId, UnitState};

/// Run state machine states.
///
/// ```text
/// CONFIGURING -> GRAPH_BUILDING -> PLANNING -> EXECUTING -> SUCCEEDED
///                                                 │  ▲
///                                                 ▼  │
///                                         AWAITING_APPROVAL
///                                                 │
///                 (any pre-terminal state) ──► FAILED
///                 EXECUTING | AWAITING_APPROVAL ──► CANCELLING ──► CANCELLED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunState {
    /// Resolving parameters and building the configuration.
    Configuring,
    /// Building and validating the dependency graph.
    GraphBuilding,
    /// Deriving the execution plan.
    Planning,
    /// Executing stages and waves.
    Executing,
    /// Suspended at a gate until external approval is recorded.
    AwaitingApproval,
    /// Every unit succeeded.
    Succeeded,
    /// A phase failed or a unit failed.
    Failed,
    /// Cancellation requested, waiting for in-flight units.
    Cancelling,
    /// Cancelled by the operator.
    Cancelled,
}

impl RunState {
    /// Returns true if this is a terminal state.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }

    /// Returns true if the transition from self to target is valid.
    #[must_use]
    pub fn can_transition_to(&self, target: Self) -> bool {
        match self {
            Self::Configuring => matches!(target, Self::GraphBuilding | Self::Failed),
            Self::GraphBuilding => matches!(target, Self::Planning | Self::Failed),
            Self::Planning => matches!(target, Self::Executing | Self::Failed),
            Self::Executing => matches!(
                target,
                Self::AwaitingApproval | Self::Succeeded | Self::Failed | Self::Cancelling
            ),
            Self::AwaitingApproval => {
                matches!(target, Self::Executing | Self::Failed | Self::Cancelling)
            }
            Self::Cancelling => matches!(target, Self::Cancelled),
            Self::Succeeded | Self::Failed | Self::Cancelled => false,
        }
    }
}

impl Default for RunState {
    fn default() -> Self {
        Self::Configuring
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Configuring => write!(f, "CONFIGURING"),
            Self::GraphBuilding => write!(f, "GRAPH_BUILDING"),
            Self::Planning => write!(f, "PLANNING"),
            Self::Executing => write!(f, "EXECUTING"),
            Self::AwaitingApproval => write!(f, "AWAITING_APPROVAL"),
            Self::Succeeded => write!(f, "SUCCEEDED"),
            Self::Failed => write!(f, "FAILED"),
            Self::Cancelling => write!(f, "CANCELLING"),
            Self::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

/// A single orchestration run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Run {
    /// Unique run identifier.
    pub id: RunId,
    /// Fingerprint of the plan being executed.
    pub plan_fingerprint: String,
    /// Deployment stage name from the build configuration.
    pub stage_name: String,
    /// Current state of the run.
    pub state: RunState,
    /// When the run was created.
    pub created_at: DateTime<Utc>,
    /// When execution began (if it did).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// When the run reached a terminal state (if it did).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Unit execution states, plan execution order.
    pub executions: Vec<UnitExecution>,
}

impl Run {
    /// Creates a new run covering every unit in the plan.
    #[must_use]
    pub fn from_plan(plan: &ExecutionPlan) -> Self {
        let executions = plan.unit_ids().into_iter().map(UnitExecution::new).collect();
        Self {
            id: RunId::generate(),
            plan_fingerprint: plan.fingerprint.clone(),
            stage_name: plan.stage_name.clone(),
            state: RunState::Configuring,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            executions,
        }
    }

    /// Creates a run with no unit executions yet.
    ///
    /// Used by the orchestrator before planning has produced unit ids; the
    /// executions are attached when the plan is known.
    #[must_use]
    pub fn new(stage_name: impl Into<String>) -> Self {
        Self {
            id: RunId::generate(),
            plan_fingerprint: String::new(),
            stage_name: stage_name.into(),
            state: RunState::Configuring,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            executions: Vec::new(),
        }
    }

    /// Attaches the plan's units once planning has finished.
    pub fn attach_plan(&mut self, plan: &ExecutionPlan) {
        self.plan_fingerprint = plan.fingerprint.clone();
        self.executions = plan.unit_ids().into_iter().map(UnitExecution::new).collect();
    }

    /// Returns true if the run is in a terminal state.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Transitions to a new state.
    ///
    /// # Errors
    ///
    /// Returns an error if the transition is invalid.
    #[tracing::instrument(skip(self), fields(run_id = %self.id, from = %self.state, to = %target))]
    pub fn transition_to(&mut self, target: RunState) -> Result<()> {
        if !self.state.can_transition_to(target) {
            return Err(Error::InvalidStateTransition {
                from: self.state.to_string(),
                to: target.to_string(),
                reason: "invalid run state transition".into(),
            });
        }

        let now = Utc::now();
        match target {
            RunState::Executing if self.started_at.is_none() => {
                self.started_at = Some(now);
            }
            RunState::Succeeded | RunState::Failed | RunState::Cancelled => {
                self.completed_at = Some(now);
            }
            _ => {}
        }

        self.state = target;
        Ok(())
    }

    /// Returns the execution record for a unit.
    #[must_use]
    pub fn execution(&self, unit_id: &UnitId) -> Option<&UnitExecution> {
        self.executions.iter().find(|e| &e.unit_id == unit_id)
    }

    /// Returns the mutable execution record for a unit.
    pub fn execution_mut(&mut self, unit_id: &UnitId) -> Option<&mut UnitExecution> {
        self.executions.iter_mut().find(|e| &e.unit_id == unit_id)
    }

    /// Returns the count of units in the given state.
    #[must_use]
    pub fn units_in_state(&self, state: UnitState) -> usize {
        self.executions.iter().filter(|e| e.state == state).count()
    }

    /// Returns the count of succeeded units.
    #[must_use]
    pub fn units_succeeded(&self) -> usize {
        self.units_in_state(UnitState::Succeeded)
    }

    /// Returns the count of failed units.
    #[must_use]
    pub fn units_failed(&self) -> usize {
        self.units_in_state(UnitState::Failed)
    }

    /// Returns the count of skipped units.
    #[must_use]
    pub fn units_skipped(&self) -> usize {
        self.units_in_state(UnitState::Skipped)
    }

    /// Marks every non-terminal unit as skipped.
    ///
    /// Used when a failure or cancellation prevents pending units from ever
    /// starting. Terminal units (including recorded successes) are left
    /// untouched.
    pub fn skip_remaining(&mut self) {
        for exec in &mut self.executions {
            if matches!(exec.state, UnitState::Pending | UnitState::Ready) {
                // Both states allow Skipped, so this cannot fail.
                let _ = exec.transition_to(UnitState::Skipped);
            }
        }
    }

    /// Computes the final run state from unit outcomes.
    ///
    /// Call after execution finishes: any failed unit fails the run, any
    /// cancelled unit marks it cancelled, otherwise it succeeded.
    #[must_use]
    pub fn compute_final_state(&self) -> RunState {
        if self.units_failed() > 0 {
            return RunState::Failed;
        }
        if self.units_in_state(UnitState::Cancelled) > 0 {
            return RunState::Cancelled;
        }
        RunState::Succeeded
    }
}

/// The outcome handed back to the orchestrator's caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    /// The completed (terminal) run, including recorded outputs.
    pub run: Run,
    /// Identity and error of the unit that failed the run, if one did.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_unit: Option<FailedUnit>,
}

/// The failed unit named in a report.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedUnit {
    /// The unit that failed.
    pub unit_id: UnitId,
    /// The recorded error.
    pub error: UnitError,
}

impl RunReport {
    /// Returns true if the run succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.run.state == RunState::Succeeded
    }

    /// Converts the report into a `Result`, turning a reported unit failure
    /// into [`Error::UnitExecutionFailed`].
    ///
    /// # Errors
    ///
    /// Returns the failed unit's identity and error if the run failed.
    pub fn into_result(self) -> Result<Run> {
        match self.failed_unit {
            Some(failed) => Err(Error::UnitExecutionFailed {
                unit: failed.unit_id,
                message: failed.error.to_string(),
            }),
            None => Ok(self.run),
        }
    }
}
