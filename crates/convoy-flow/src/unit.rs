//! Deployable units and their execution state.
//!
//! This module provides:
//! - `UnitId` / `OutputName`: declared names for units and their outputs
//! - `Binding`: a named producer/consumer edge
//! - `UnitSpec`: the static declaration of one deployable unit
//! - `UnitState`: the state machine for unit execution
//! - `UnitExecution`: execution tracking with write-once outputs
//! - `UnitError`: error information from failed execution

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// The declared name of a deployable unit.
///
/// Unit ids are operator-chosen names (`auth-layer`, `cognito`, ...), not
/// generated identifiers: the graph, the plan, and every error message
/// speak in terms of them.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnitId(String);

impl UnitId {
    /// Creates a new unit id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for UnitId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for UnitId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// The declared name of an output a unit produces.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OutputName(String);

impl OutputName {
    /// Creates a new output name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OutputName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for OutputName {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for OutputName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A named producer/consumer edge: "this unit consumes `output` from
/// `producer`".
///
/// Every cross-unit data flow is a declared binding rather than an implicit
/// object reference, which makes ordering and cycles statically checkable.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Binding {
    /// The unit that produces the value.
    pub producer: UnitId,
    /// The output name on the producer.
    pub output: OutputName,
}

impl Binding {
    /// Creates a new binding.
    #[must_use]
    pub fn new(producer: impl Into<UnitId>, output: impl Into<OutputName>) -> Self {
        Self {
            producer: producer.into(),
            output: output.into(),
        }
    }
}

impl fmt::Display for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.producer, self.output)
    }
}

impl From<(&str, &str)> for Binding {
    fn from((producer, output): (&str, &str)) -> Self {
        Self::new(producer, output)
    }
}

/// Static declaration of one deployable unit.
///
/// A unit is an atomic, account/region-scoped operation: the scheduler
/// treats it as all-or-nothing and knows nothing about the resources it
/// creates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitSpec {
    /// Unit id, unique within a run's declarations.
    pub id: UnitId,
    /// Logical account slot the unit deploys into (resolved through the
    /// build configuration).
    pub account_slot: String,
    /// Pure ordering dependencies with no data flow.
    #[serde(default)]
    pub depends_on: Vec<UnitId>,
    /// Named outputs this unit produces on success.
    #[serde(default)]
    pub produces: Vec<OutputName>,
    /// Outputs this unit consumes from other units.
    #[serde(default)]
    pub consumes: Vec<Binding>,
}

impl UnitSpec {
    /// Creates a new unit spec with no dependencies, outputs, or inputs.
    #[must_use]
    pub fn new(id: impl Into<UnitId>, account_slot: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            account_slot: account_slot.into(),
            depends_on: Vec::new(),
            produces: Vec::new(),
            consumes: Vec::new(),
        }
    }

    /// Adds a pure ordering dependency.
    #[must_use]
    pub fn depends_on(mut self, unit: impl Into<UnitId>) -> Self {
        self.depends_on.push(unit.into());
        self
    }

    /// Declares an output this unit produces.
    #[must_use]
    pub fn produces(mut self, output: impl Into<OutputName>) -> Self {
        self.produces.push(output.into());
        self
    }

    /// Declares a consumed binding.
    #[must_use]
    pub fn consumes(mut self, binding: impl Into<Binding>) -> Self {
        self.consumes.push(binding.into());
        self
    }

    /// Returns every unit this spec depends on, data-flow and ordering
    /// edges alike, in declaration order without duplicates.
    #[must_use]
    pub fn upstream_units(&self) -> Vec<UnitId> {
        let mut upstream = Vec::new();
        for binding in &self.consumes {
            if !upstream.contains(&binding.producer) {
                upstream.push(binding.producer.clone());
            }
        }
        for dep in &self.depends_on {
            if !upstream.contains(dep) {
                upstream.push(dep.clone());
            }
        }
        upstream
    }
}

/// Unit execution state machine.
///
/// ```text
/// PENDING ──► READY ──► RUNNING ──► SUCCEEDED
///    │          │          │
///    │          │          └──────► FAILED
///    └──────────┴─────────────────► SKIPPED | CANCELLED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UnitState {
    /// Exists in the plan, upstream work not finished.
    Pending,
    /// All consumed bindings resolved, eligible for its wave.
    Ready,
    /// Handed to the deployment backend.
    Running,
    /// Completed successfully; outputs recorded.
    Succeeded,
    /// The backend reported failure.
    Failed,
    /// Never started because an earlier unit failed or the run was
    /// aborted.
    Skipped,
    /// Cancelled by the operator.
    Cancelled,
}

impl UnitState {
    /// Returns true if this is a terminal state.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Succeeded | Self::Failed | Self::Skipped | Self::Cancelled
        )
    }

    /// Returns true if the transition from self to target is valid.
    #[must_use]
    pub fn can_transition_to(&self, target: Self) -> bool {
        match self {
            Self::Pending => matches!(target, Self::Ready | Self::Skipped | Self::Cancelled),
            Self::Ready => matches!(target, Self::Running | Self::Skipped | Self::Cancelled),
            Self::Running => matches!(target, Self::Succeeded | Self::Failed | Self::Cancelled),
            Self::Succeeded | Self::Failed | Self::Skipped | Self::Cancelled => false,
        }
    }
}

impl Default for UnitState {
    fn default() -> Self {
        Self::Pending
    }
}

impl fmt::Display for UnitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Ready => write!(f, "READY"),
            Self::Running => write!(f, "RUNNING"),
            Self::Succeeded => write!(f, "SUCCEEDED"),
            Self::Failed => write!(f, "FAILED"),
            Self::Skipped => write!(f, "SKIPPED"),
            Self::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

/// Category of a unit execution failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitErrorCategory {
    /// The deployment backend reported a failure.
    Backend,
    /// The backend did not finish in time.
    Timeout,
    /// The unit was cancelled mid-flight.
    Cancelled,
}

impl fmt::Display for UnitErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Backend => write!(f, "backend"),
            Self::Timeout => write!(f, "timeout"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Error information from a failed unit execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitError {
    /// Failure category.
    pub category: UnitErrorCategory,
    /// Human-readable description.
    pub message: String,
}

impl UnitError {
    /// Creates a new unit error.
    #[must_use]
    pub fn new(category: UnitErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
        }
    }
}

impl fmt::Display for UnitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.category, self.message)
    }
}

/// Execution tracking for a single unit within a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitExecution {
    /// The unit being tracked.
    pub unit_id: UnitId,
    /// Current state.
    pub state: UnitState,
    /// When the backend call started.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// When the unit reached a terminal state.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Outputs recorded on success. Written exactly once.
    #[serde(default)]
    pub outputs: BTreeMap<OutputName, String>,
    /// Error recorded on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<UnitError>,
}

impl UnitExecution {
    /// Creates a new execution in the pending state.
    #[must_use]
    pub fn new(unit_id: UnitId) -> Self {
        Self {
            unit_id,
            state: UnitState::Pending,
            started_at: None,
            completed_at: None,
            outputs: BTreeMap::new(),
            error: None,
        }
    }

    /// Returns true if the execution is in a terminal state.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Transitions to a new state, stamping timestamps on entry to
    /// `Running` and terminal states.
    ///
    /// # Errors
    ///
    /// Returns an error if the transition is invalid.
    pub fn transition_to(&mut self, target: UnitState) -> Result<()> {
        if !self.state.can_transition_to(target) {
            return Err(Error::InvalidStateTransition {
                from: self.state.to_string(),
                to: target.to_string(),
                reason: format!("unit {}", self.unit_id),
            });
        }

        let now = Utc::now();
        match target {
            UnitState::Running => self.started_at = Some(now),
            UnitState::Succeeded | UnitState::Failed | UnitState::Skipped | UnitState::Cancelled => {
                self.completed_at = Some(now);
            }
            _ => {}
        }

        self.state = target;
        Ok(())
    }

    /// Records the outputs of a successful execution and transitions to
    /// `Succeeded`.
    ///
    /// Outputs are write-once: they can only be recorded from `Running`,
    /// and a terminal execution rejects any further write.
    ///
    /// # Errors
    ///
    /// Returns an error if the execution is not currently running.
    pub fn record_success(&mut self, outputs: BTreeMap<OutputName, String>) -> Result<()> {
        self.transition_to(UnitState::Succeeded)?;
        self.outputs = outputs;
        Ok(())
    }

    /// Records a failure and transitions to `Failed`.
    ///
    /// # Errors
    ///
    /// Returns an error if the execution is not currently running.
    pub fn record_failure(&mut self, error: UnitError) -> Result<()> {
        self.transition_to(UnitState::Failed)?;
        self.error = Some(error);
        Ok(())
    }

    /// Returns a recorded output by name.
    #[must_use]
    pub fn output(&self, name: &OutputName) -> Option<&str> {
        self.outputs.get(name).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_spec_builder_collects_edges() {
        let spec = UnitSpec::new("cognito", "backend")
            .consumes(("auth-layer", "layerArn"))
            .depends_on("dynamodb")
            .produces("userPoolId");

        assert_eq!(spec.id.as_str(), "cognito");
        assert_eq!(spec.consumes.len(), 1);
        assert_eq!(
            spec.upstream_units(),
            vec![UnitId::new("auth-layer"), UnitId::new("dynamodb")]
        );
    }

    #[test]
    fn upstream_units_deduplicates() {
        let spec = UnitSpec::new("lambda", "backend")
            .consumes(("auth-layer", "layerArn"))
            .consumes(("auth-layer", "layerVersion"))
            .depends_on("auth-layer");

        assert_eq!(spec.upstream_units(), vec![UnitId::new("auth-layer")]);
    }

    #[test]
    fn state_machine_happy_path() {
        let mut exec = UnitExecution::new(UnitId::new("auth-layer"));
        exec.transition_to(UnitState::Ready).unwrap();
        exec.transition_to(UnitState::Running).unwrap();
        assert!(exec.started_at.is_some());

        let mut outputs = BTreeMap::new();
        outputs.insert(OutputName::new("layerArn"), "arn:aws:lambda:x".to_string());
        exec.record_success(outputs).unwrap();

        assert_eq!(exec.state, UnitState::Succeeded);
        assert!(exec.completed_at.is_some());
        assert_eq!(exec.output(&OutputName::new("layerArn")), Some("arn:aws:lambda:x"));
    }

    #[test]
    fn outputs_are_write_once() {
        let mut exec = UnitExecution::new(UnitId::new("auth-layer"));
        exec.transition_to(UnitState::Ready).unwrap();
        exec.transition_to(UnitState::Running).unwrap();
        exec.record_success(BTreeMap::new()).unwrap();

        let result = exec.record_success(BTreeMap::new());
        assert!(matches!(
            result,
            Err(Error::InvalidStateTransition { .. })
        ));
    }

    #[test]
    fn terminal_states_reject_transitions() {
        assert!(!UnitState::Succeeded.can_transition_to(UnitState::Running));
        assert!(!UnitState::Failed.can_transition_to(UnitState::Ready));
        assert!(!UnitState::Skipped.can_transition_to(UnitState::Pending));
    }

    #[test]
    fn pending_can_be_skipped() {
        let mut exec = UnitExecution::new(UnitId::new("consumer"));
        exec.transition_to(UnitState::Skipped).unwrap();
        assert!(exec.is_terminal());
        assert!(exec.outputs.is_empty());
    }

    #[test]
    fn failure_keeps_error_and_no_outputs() {
        let mut exec = UnitExecution::new(UnitId::new("consumer"));
        exec.transition_to(UnitState::Ready).unwrap();
        exec.transition_to(UnitState::Running).unwrap();
        exec.record_failure(UnitError::new(UnitErrorCategory::Backend, "boom"))
            .unwrap();

        assert_eq!(exec.state, UnitState::Failed);
        assert!(exec.outputs.is_empty());
        assert_eq!(exec.error.as_ref().unwrap().message, "boom");
    }
}
