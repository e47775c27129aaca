//! The top-level orchestration driver.
//!
//! One [`Orchestrator::run`] call drives a full deployment:
//!
//! 1. **Configuring**: resolve every parameter the config builder needs
//!    (optionally through a cross-account role assumption) and build the
//!    immutable `BuildConfig`
//! 2. **GraphBuilding**: validate unit declarations into a dependency graph
//! 3. **Planning**: derive the staged, gated execution plan
//! 4. **Executing**: stage by stage, wave by wave; units within a wave run
//!    concurrently and join at a barrier before the next wave starts
//!
//! Gates suspend the run in `AwaitingApproval` until the external channel
//! answers; an operator-supplied timeout fails the run instead of hanging.
//! A unit failure finishes the current wave, skips everything not yet
//! started, and reports the failed unit. Recorded outputs are never rolled
//! back here.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;

use convoy_core::{AccountTarget, BuildConfig};
use convoy_params::{ConfigBuilder, CredentialExchange, ParameterResolver, ParameterStore};

use crate::backend::{Approval, ApprovalChannel, DeployBackend, DeployContext, DeployOutcome};
use crate::error::{Error, Result};
use crate::graph::DependencyGraph;
use crate::metrics::FlowMetrics;
use crate::plan::{ExecutionPlan, GateLabel, GateSpec, Stage, StageSpec, Wave};
use crate::run::{FailedUnit, Run, RunReport, RunState};
use crate::scheduler::WaveScheduler;
use crate::unit::{OutputName, UnitError, UnitErrorCategory, UnitId, UnitSpec, UnitState};

/// Shared cancellation flag for a run.
///
/// Cancellation is cooperative and wave-grained: in-flight units finish or
/// fail naturally, and no new wave or stage starts once the flag is set.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    /// Creates a new, unset handle.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Returns true if cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Everything one orchestration run needs, declared up front.
pub struct RunRequest {
    /// Configuration declaration (slots, externals, removal policy).
    pub config: ConfigBuilder,
    /// Cross-account role to assume for parameter resolution; `None` uses
    /// the ambient identity.
    pub assume_role_arn: Option<String>,
    /// Unit declarations.
    pub units: Vec<UnitSpec>,
    /// Stage grouping hints (empty for one implicit stage).
    pub stages: Vec<StageSpec>,
    /// Manual-approval gates at stage boundaries.
    pub gates: Vec<GateSpec>,
}

/// The top-level driver: configuration, graph, plan, execution.
pub struct Orchestrator<S, X, B, A> {
    resolver: ParameterResolver<S, X>,
    backend: Arc<B>,
    approvals: Arc<A>,
    scheduler: WaveScheduler,
    gate_timeout: Option<Duration>,
    metrics: FlowMetrics,
    cancel: CancelHandle,
}

impl<S, X, B, A> Orchestrator<S, X, B, A>
where
    S: ParameterStore,
    X: CredentialExchange,
    B: DeployBackend + 'static,
    A: ApprovalChannel + 'static,
{
    /// Creates a new orchestrator over its four collaborators.
    #[must_use]
    pub fn new(store: S, exchange: X, backend: B, approvals: A) -> Self {
        Self {
            resolver: ParameterResolver::new(store, exchange),
            backend: Arc::new(backend),
            approvals: Arc::new(approvals),
            scheduler: WaveScheduler::new(),
            gate_timeout: None,
            metrics: FlowMetrics::new(),
            cancel: CancelHandle::new(),
        }
    }

    /// Sets the operator-supplied gate timeout.
    ///
    /// Without one, a gate blocks the run indefinitely by design.
    #[must_use]
    pub fn gate_timeout(mut self, timeout: Duration) -> Self {
        self.gate_timeout = Some(timeout);
        self
    }

    /// Replaces the metrics recorder.
    #[must_use]
    pub fn metrics(mut self, metrics: FlowMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    /// Returns a handle for cancelling the run from another task.
    #[must_use]
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Drives one deployment run to a terminal state.
    ///
    /// Unit failure is an expected outcome and is reported through the
    /// returned [`RunReport`]; configuration, graph, planning, and gate
    /// failures abort with an error carrying full context.
    ///
    /// # Errors
    ///
    /// - [`Error::Params`] for resolution and configuration failures
    /// - [`Error::UnknownAccountSlot`] if a unit targets an undeclared slot
    /// - graph validation errors ([`Error::CycleDetected`],
    ///   [`Error::UnresolvedReference`], ...)
    /// - [`Error::PlanGeneration`] for bad stage or gate declarations
    /// - [`Error::GateTimeout`] / [`Error::GateDeclined`] for gate outcomes
    #[tracing::instrument(
        skip(self, request),
        fields(stage = request.config.stage(), unit_count = request.units.len())
    )]
    pub async fn run(&self, request: RunRequest) -> Result<RunReport> {
        let mut run = Run::new(request.config.stage());
        self.metrics.set_active_runs(1);

        let result = self.drive(&mut run, request).await;
        self.metrics.set_active_runs(0);

        match result {
            Ok(report) => {
                self.metrics
                    .record_run(&report.run.state.to_string().to_lowercase());
                Ok(report)
            }
            Err(err) => {
                if !run.is_terminal() {
                    // Every pre-terminal state may fail; the transition is
                    // only refused if we already recorded an outcome.
                    let _ = run.transition_to(RunState::Failed);
                }
                self.metrics.record_run("failed");
                tracing::warn!(run_id = %run.id, error = %err, "run aborted");
                Err(err)
            }
        }
    }

    async fn drive(&self, run: &mut Run, request: RunRequest) -> Result<RunReport> {
        // Configuring.
        let config = self
            .resolve_config(&request.config, request.assume_role_arn.as_deref())
            .await?;
        let config = Arc::new(config);
        validate_account_slots(&request.units, &config)?;

        // GraphBuilding.
        run.transition_to(RunState::GraphBuilding)?;
        let graph = DependencyGraph::build(request.units)?;

        // Planning.
        run.transition_to(RunState::Planning)?;
        let plan = self
            .scheduler
            .plan(&graph, &request.stages, &request.gates, config.stage.clone())?;
        run.attach_plan(&plan);

        // Executing.
        run.transition_to(RunState::Executing)?;
        self.execute_plan(run, &graph, &plan, &config).await
    }

    async fn resolve_config(
        &self,
        builder: &ConfigBuilder,
        assume_role_arn: Option<&str>,
    ) -> Result<BuildConfig> {
        let paths = builder.required_paths();
        let resolved = self.resolver.resolve(&paths, assume_role_arn).await?;
        Ok(builder.build(&resolved)?)
    }

    async fn execute_plan(
        &self,
        run: &mut Run,
        graph: &DependencyGraph,
        plan: &ExecutionPlan,
        config: &Arc<BuildConfig>,
    ) -> Result<RunReport> {
        for stage in &plan.stages {
            if self.cancel.is_cancelled() {
                return self.finish_cancelled(run);
            }

            if let Some(label) = &stage.gate {
                self.await_gate(run, label).await?;
            }

            for wave in &stage.waves {
                if self.cancel.is_cancelled() {
                    return self.finish_cancelled(run);
                }

                if let Some(failed) = self.execute_wave(run, graph, stage, wave, config).await? {
                    run.skip_remaining();
                    run.transition_to(RunState::Failed)?;
                    tracing::warn!(
                        run_id = %run.id,
                        unit = %failed.unit_id,
                        error = %failed.error,
                        "wave failed; later waves will not start"
                    );
                    return Ok(RunReport {
                        run: run.clone(),
                        failed_unit: Some(failed),
                    });
                }
            }
        }

        run.transition_to(RunState::Succeeded)?;
        Ok(RunReport {
            run: run.clone(),
            failed_unit: None,
        })
    }

    /// Suspends the run at a gate until the channel answers.
    async fn await_gate(&self, run: &mut Run, label: &GateLabel) -> Result<()> {
        run.transition_to(RunState::AwaitingApproval)?;
        tracing::info!(run_id = %run.id, gate = %label, "awaiting approval");

        let started = Instant::now();
        let decision = match self.gate_timeout {
            Some(timeout) => {
                match tokio::time::timeout(timeout, self.approvals.await_approval(label)).await {
                    Ok(decision) => decision,
                    Err(_) => {
                        run.skip_remaining();
                        run.transition_to(RunState::Failed)?;
                        return Err(Error::GateTimeout {
                            label: label.to_string(),
                        });
                    }
                }
            }
            None => self.approvals.await_approval(label).await,
        };
        self.metrics
            .observe_gate_wait(label.as_str(), started.elapsed().as_secs_f64());

        match decision {
            Approval::Granted => {
                tracing::info!(run_id = %run.id, gate = %label, "approval granted");
                run.transition_to(RunState::Executing)?;
                Ok(())
            }
            Approval::Denied => {
                tracing::warn!(run_id = %run.id, gate = %label, "approval denied");
                run.skip_remaining();
                run.transition_to(RunState::Failed)?;
                Err(Error::GateDeclined {
                    label: label.to_string(),
                })
            }
        }
    }

    /// Executes one wave to completion and returns the first failure, if
    /// any. Outputs of successful units are recorded before this returns,
    /// which is the barrier later waves rely on.
    async fn execute_wave(
        &self,
        run: &mut Run,
        graph: &DependencyGraph,
        stage: &Stage,
        wave: &Wave,
        config: &Arc<BuildConfig>,
    ) -> Result<Option<FailedUnit>> {
        let wave_started = Instant::now();

        // Resolve each member's inputs and target from already-recorded
        // state before touching any execution state.
        let mut dispatches: Vec<(UnitSpec, BTreeMap<OutputName, String>, AccountTarget)> =
            Vec::with_capacity(wave.units.len());
        for unit_id in &wave.units {
            let spec = graph
                .unit(unit_id)
                .ok_or_else(|| Error::UnitNotFound {
                    unit: unit_id.clone(),
                })?
                .clone();
            let inputs = resolve_inputs(run, &spec)?;
            let target = config
                .account(&spec.account_slot)
                .cloned()
                .ok_or_else(|| Error::UnknownAccountSlot {
                    unit: spec.id.clone(),
                    slot: spec.account_slot.clone(),
                })?;
            dispatches.push((spec, inputs, target));
        }

        for (spec, _, _) in &dispatches {
            let exec = run
                .execution_mut(&spec.id)
                .ok_or_else(|| Error::UnitNotFound {
                    unit: spec.id.clone(),
                })?;
            exec.transition_to(UnitState::Ready)?;
            exec.transition_to(UnitState::Running)?;
            self.metrics.record_unit_transition("pending", "running");
        }

        let futures = dispatches.into_iter().map(|(spec, inputs, target)| {
            let backend = Arc::clone(&self.backend);
            let config = Arc::clone(config);
            let run_id = run.id;
            let stage_name = run.stage_name.clone();
            async move {
                let context = DeployContext {
                    run_id,
                    stage_name,
                    target,
                    config,
                };
                let outcome = backend.deploy(&context, &spec, &inputs).await;
                (spec.id.clone(), outcome)
            }
        });

        let outcomes = join_all(futures).await;
        tracing::debug!(
            run_id = %run.id,
            stage = %stage.name,
            wave_size = outcomes.len(),
            "wave joined"
        );

        let mut first_failure: Option<FailedUnit> = None;
        for (unit_id, outcome) in outcomes {
            let exec = run
                .execution_mut(&unit_id)
                .ok_or_else(|| Error::UnitNotFound {
                    unit: unit_id.clone(),
                })?;
            match outcome {
                DeployOutcome::Succeeded(outputs) => {
                    exec.record_success(outputs)?;
                    self.metrics.record_unit_transition("running", "succeeded");
                }
                DeployOutcome::Failed(error) => {
                    exec.record_failure(error.clone())?;
                    self.metrics.record_unit_transition("running", "failed");
                    if first_failure.is_none() {
                        first_failure = Some(FailedUnit { unit_id, error });
                    }
                }
                DeployOutcome::Cancelled => {
                    exec.transition_to(UnitState::Cancelled)?;
                    self.metrics.record_unit_transition("running", "cancelled");
                    if first_failure.is_none() {
                        first_failure = Some(FailedUnit {
                            unit_id,
                            error: UnitError::new(
                                UnitErrorCategory::Cancelled,
                                "unit cancelled by backend",
                            ),
                        });
                    }
                }
            }
        }

        self.metrics
            .observe_wave_duration(wave_started.elapsed().as_secs_f64());
        Ok(first_failure)
    }

    fn finish_cancelled(&self, run: &mut Run) -> Result<RunReport> {
        run.skip_remaining();
        run.transition_to(RunState::Cancelling)?;
        run.transition_to(RunState::Cancelled)?;
        tracing::info!(run_id = %run.id, "run cancelled; no further waves started");
        Ok(RunReport {
            run: run.clone(),
            failed_unit: None,
        })
    }
}

/// Every unit must target a slot the configuration declares; catching this
/// before graph building keeps backend calls free of slot lookups that can
/// fail.
fn validate_account_slots(units: &[UnitSpec], config: &BuildConfig) -> Result<()> {
    for unit in units {
        if config.account(&unit.account_slot).is_none() {
            return Err(Error::UnknownAccountSlot {
                unit: unit.id.clone(),
                slot: unit.account_slot.clone(),
            });
        }
    }
    Ok(())
}

/// Looks up a consumer's inputs from its producers' recorded outputs.
fn resolve_inputs(run: &Run, spec: &UnitSpec) -> Result<BTreeMap<OutputName, String>> {
    let mut inputs = BTreeMap::new();
    for binding in &spec.consumes {
        let value = run
            .execution(&binding.producer)
            .and_then(|exec| exec.output(&binding.output))
            .ok_or_else(|| Error::UnresolvedOutput {
                unit: spec.id.clone(),
                producer: binding.producer.clone(),
                output: binding.output.clone(),
            })?;
        inputs.insert(binding.output.clone(), value.to_string());
    }
    Ok(inputs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{AutoApprover, NoOpBackend};
    use convoy_params::{ExternalSpec, SlotSpec, StaticExchange};
    use convoy_params::prelude::InMemoryParameterStore;

    fn production_config() -> ConfigBuilder {
        ConfigBuilder::new("production")
            .slot(SlotSpec::new(
                "backend",
                "/account/sso/prod/backend",
                "ap-southeast-1",
            ))
            .slot(SlotSpec::new(
                "frontend",
                "/account/sso/frontend",
                "ap-southeast-1",
            ))
            .external(ExternalSpec::new(
                "wildcardDomainCertificateArn",
                "/arn/share/domainAcm/wildcardDomain",
            ))
    }

    fn seeded_store() -> InMemoryParameterStore {
        InMemoryParameterStore::new()
            .with_parameter("/account/sso/prod/backend", "111122223333")
            .with_parameter("/account/sso/frontend", "444455556666")
            .with_parameter("/arn/share/domainAcm/wildcardDomain", "arn:aws:acm:x")
    }

    fn layer_units() -> Vec<UnitSpec> {
        vec![
            UnitSpec::new("auth-layer", "backend").produces("layerArn"),
            UnitSpec::new("cognito", "backend").consumes(("auth-layer", "layerArn")),
            UnitSpec::new("amplify", "frontend").consumes(("auth-layer", "layerArn")),
        ]
    }

    #[tokio::test]
    async fn full_run_succeeds_and_propagates_outputs() {
        let orchestrator =
            Orchestrator::new(seeded_store(), StaticExchange::new(), NoOpBackend, AutoApprover);

        let report = orchestrator
            .run(RunRequest {
                config: production_config(),
                assume_role_arn: None,
                units: layer_units(),
                stages: Vec::new(),
                gates: Vec::new(),
            })
            .await
            .unwrap();

        assert!(report.is_success());
        assert_eq!(report.run.units_succeeded(), 3);
        let layer = report.run.execution(&UnitId::new("auth-layer")).unwrap();
        assert_eq!(
            layer.output(&OutputName::new("layerArn")),
            Some("auth-layer::layerArn")
        );
    }

    #[tokio::test]
    async fn unknown_account_slot_fails_before_graph_building() {
        let orchestrator =
            Orchestrator::new(seeded_store(), StaticExchange::new(), NoOpBackend, AutoApprover);

        let err = orchestrator
            .run(RunRequest {
                config: production_config(),
                assume_role_arn: None,
                units: vec![UnitSpec::new("edge", "cdn")],
                stages: Vec::new(),
                gates: Vec::new(),
            })
            .await
            .unwrap_err();

        assert!(matches!(err, Error::UnknownAccountSlot { slot, .. } if slot == "cdn"));
    }

    #[tokio::test]
    async fn missing_parameters_abort_during_configuring() {
        let store = InMemoryParameterStore::new()
            .with_parameter("/account/sso/prod/backend", "111122223333");
        let orchestrator =
            Orchestrator::new(store, StaticExchange::new(), NoOpBackend, AutoApprover);

        let err = orchestrator
            .run(RunRequest {
                config: production_config(),
                assume_role_arn: None,
                units: layer_units(),
                stages: Vec::new(),
                gates: Vec::new(),
            })
            .await
            .unwrap_err();

        match err {
            Error::Params(convoy_params::Error::MissingParameters { paths }) => {
                assert_eq!(
                    paths,
                    vec![
                        "/account/sso/frontend".to_string(),
                        "/arn/share/domainAcm/wildcardDomain".to_string(),
                    ]
                );
            }
            other => panic!("expected MissingParameters, got {other}"),
        }
    }

    #[tokio::test]
    async fn cancellation_before_execution_skips_everything() {
        let orchestrator =
            Orchestrator::new(seeded_store(), StaticExchange::new(), NoOpBackend, AutoApprover);
        orchestrator.cancel_handle().cancel();

        let report = orchestrator
            .run(RunRequest {
                config: production_config(),
                assume_role_arn: None,
                units: layer_units(),
                stages: Vec::new(),
                gates: Vec::new(),
            })
            .await
            .unwrap();

        assert_eq!(report.run.state, RunState::Cancelled);
        assert_eq!(report.run.units_skipped(), 3);
        assert!(report.failed_unit.is_none());
    }
}
