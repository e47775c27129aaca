//! Deployment backend and approval channel traits.
//!
//! Both are external collaborators: the backend turns a fully-resolved unit
//! into cloud resources (opaque to this crate), and the approval channel
//! answers gate labels. The implementations shipped here exist for tests
//! and local development.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use convoy_core::{AccountTarget, BuildConfig, RunId};

use crate::plan::GateLabel;
use crate::unit::{OutputName, UnitError, UnitSpec};

/// Context handed to the backend for one unit execution.
#[derive(Debug, Clone)]
pub struct DeployContext {
    /// Run this execution belongs to.
    pub run_id: RunId,
    /// Deployment stage name.
    pub stage_name: String,
    /// Concrete account/region the unit deploys into.
    pub target: AccountTarget,
    /// The run's immutable build configuration.
    pub config: Arc<BuildConfig>,
}

/// Result of one unit execution.
#[derive(Debug)]
pub enum DeployOutcome {
    /// Unit completed; produced outputs by name.
    Succeeded(BTreeMap<OutputName, String>),
    /// Unit failed with a structured error.
    Failed(UnitError),
    /// Unit was cancelled before completion.
    Cancelled,
}

impl DeployOutcome {
    /// Returns true if the unit succeeded.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded(_))
    }

    /// Returns the outputs if succeeded.
    #[must_use]
    pub const fn outputs(&self) -> Option<&BTreeMap<OutputName, String>> {
        match self {
            Self::Succeeded(outputs) => Some(outputs),
            _ => None,
        }
    }

    /// Returns the error if failed.
    #[must_use]
    pub const fn error(&self) -> Option<&UnitError> {
        match self {
            Self::Failed(error) => Some(error),
            _ => None,
        }
    }
}

/// Trait for executing deployable units.
///
/// Implementations deploy the unit's resources into the target account and
/// return the outputs it declared. Retries, diffing, and rollback live
/// behind this trait, not in the orchestrator.
#[async_trait]
pub trait DeployBackend: Send + Sync {
    /// Executes a unit with its fully-resolved input bindings.
    ///
    /// `inputs` holds one entry per consumed binding, keyed by output name.
    async fn deploy(
        &self,
        context: &DeployContext,
        unit: &UnitSpec,
        inputs: &BTreeMap<OutputName, String>,
    ) -> DeployOutcome;
}

/// A backend for testing that succeeds immediately.
///
/// Every declared output is produced with a synthetic value derived from
/// the unit id, so consumers downstream observe real propagation.
#[derive(Debug, Default)]
pub struct NoOpBackend;

#[async_trait]
impl DeployBackend for NoOpBackend {
    async fn deploy(
        &self,
        _context: &DeployContext,
        unit: &UnitSpec,
        _inputs: &BTreeMap<OutputName, String>,
    ) -> DeployOutcome {
        let outputs = unit
            .produces
            .iter()
            .map(|name| (name.clone(), format!("{}::{name}", unit.id)))
            .collect();
        DeployOutcome::Succeeded(outputs)
    }
}

/// A backend that fails a configured set of units and succeeds the rest.
#[derive(Debug)]
pub struct FailingBackend {
    failures: BTreeMap<String, UnitError>,
}

impl FailingBackend {
    /// Creates a backend that fails only the named units.
    #[must_use]
    pub fn new() -> Self {
        Self {
            failures: BTreeMap::new(),
        }
    }

    /// Adds a unit that should fail with the given error.
    #[must_use]
    pub fn fail_unit(mut self, unit_id: impl Into<String>, error: UnitError) -> Self {
        self.failures.insert(unit_id.into(), error);
        self
    }
}

impl Default for FailingBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DeployBackend for FailingBackend {
    async fn deploy(
        &self,
        context: &DeployContext,
        unit: &UnitSpec,
        inputs: &BTreeMap<OutputName, String>,
    ) -> DeployOutcome {
        if let Some(error) = self.failures.get(unit.id.as_str()) {
            return DeployOutcome::Failed(error.clone());
        }
        NoOpBackend.deploy(context, unit, inputs).await
    }
}

/// An approval decision for a gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Approval {
    /// The gate was approved; the following stage may start.
    Granted,
    /// The gate was declined; the run must not proceed.
    Denied,
}

/// Trait for the external approval signal channel.
///
/// The concrete mechanism (console click, webhook, timer) is outside this
/// crate; the orchestrator only awaits a decision per label. Timeouts are
/// enforced by the orchestrator, not the channel.
#[async_trait]
pub trait ApprovalChannel: Send + Sync {
    /// Waits until a decision for the label is recorded.
    async fn await_approval(&self, label: &GateLabel) -> Approval;
}

/// An approval channel that grants everything immediately.
#[derive(Debug, Default)]
pub struct AutoApprover;

#[async_trait]
impl ApprovalChannel for AutoApprover {
    async fn await_approval(&self, _label: &GateLabel) -> Approval {
        Approval::Granted
    }
}

/// An approval channel that denies everything immediately.
#[derive(Debug, Default)]
pub struct DenyingApprover;

#[async_trait]
impl ApprovalChannel for DenyingApprover {
    async fn await_approval(&self, _label: &GateLabel) -> Approval {
        Approval::Denied
    }
}

/// An approval channel fed by a queue of pre-recorded decisions.
///
/// A gate whose label has no queued decision waits forever, which is how
/// tests exercise the orchestrator's gate timeout.
#[derive(Debug, Default)]
pub struct QueuedApprover {
    decisions: Mutex<BTreeMap<String, Approval>>,
}

impl QueuedApprover {
    /// Creates an approver with no recorded decisions.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a decision for a label.
    pub async fn record(&self, label: impl Into<String>, decision: Approval) {
        self.decisions.lock().await.insert(label.into(), decision);
    }
}

#[async_trait]
impl ApprovalChannel for QueuedApprover {
    async fn await_approval(&self, label: &GateLabel) -> Approval {
        loop {
            if let Some(decision) = self.decisions.lock().await.get(label.as_str()) {
                return *decision;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
    }
}
