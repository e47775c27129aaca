//! Integration tests for convoy-flow orchestration.
//!
//! These drive the full lifecycle against in-memory collaborators:
//! configuration resolution, graph building, planning, gated execution,
//! and failure handling.

use std::sync::Arc;
use std::time::Duration;

use convoy_flow::backend::{
    Approval, AutoApprover, DenyingApprover, FailingBackend, NoOpBackend, QueuedApprover,
};
use convoy_flow::error::Error;
use convoy_flow::orchestrator::{Orchestrator, RunRequest};
use convoy_flow::plan::{GateSpec, StageSpec};
use convoy_flow::run::RunState;
use convoy_flow::unit::{OutputName, UnitError, UnitErrorCategory, UnitId, UnitSpec, UnitState};
use convoy_params::prelude::InMemoryParameterStore;
use convoy_params::{ConfigBuilder, ExternalSpec, SlotSpec, StaticExchange};

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

/// The layer-before-consumers topology from the production system: a shared
/// layer publishes an identifier, two independent consumers reference it.
fn layer_units() -> Vec<UnitSpec> {
    vec![
        UnitSpec::new("auth-layer", "backend").produces("layerArn"),
        UnitSpec::new("cognito", "backend").consumes(("auth-layer", "layerArn")),
        UnitSpec::new("amplify", "frontend").consumes(("auth-layer", "layerArn")),
    ]
}

fn layer_stages() -> Vec<StageSpec> {
    vec![
        StageSpec::new("backend-layer", vec![UnitId::new("auth-layer")]),
        StageSpec::new(
            "deploy",
            vec![UnitId::new("cognito"), UnitId::new("amplify")],
        ),
    ]
}

/// Full lifecycle: resolve -> graph -> plan -> execute -> succeeded.
#[tokio::test]
async fn full_orchestration_lifecycle() {
    let orchestrator = Orchestrator::new(
        seeded_store(),
        StaticExchange::new(),
        NoOpBackend,
        AutoApprover,
    );

    let report = orchestrator
        .run(RunRequest {
            config: production_config(),
            assume_role_arn: Some("arn:aws:iam::111122223333:role/OrganizationAccountAccessRole".into()),
            units: layer_units(),
            stages: layer_stages(),
            gates: vec![GateSpec::new(0, "Promote-To-Prod")],
        })
        .await
        .expect("run should succeed");

    assert!(report.is_success());
    assert_eq!(report.run.state, RunState::Succeeded);
    assert_eq!(report.run.units_succeeded(), 3);
    assert!(report.run.started_at.is_some());
    assert!(report.run.completed_at.is_some());

    // Consumers saw the layer's output propagated through the wave barrier.
    let cognito = report.run.execution(&UnitId::new("cognito")).unwrap();
    assert_eq!(cognito.state, UnitState::Succeeded);
}

/// A gate between stages blocks stage 2 until approval is recorded.
#[tokio::test]
async fn gate_blocks_until_approval_arrives() {
    let approver = QueuedApprover::new();
    approver.record("Promote-To-Prod", Approval::Granted).await;

    let orchestrator = Orchestrator::new(
        seeded_store(),
        StaticExchange::new(),
        NoOpBackend,
        approver,
    )
    .gate_timeout(Duration::from_secs(5));

    let report = orchestrator
        .run(RunRequest {
            config: production_config(),
            assume_role_arn: None,
            units: layer_units(),
            stages: layer_stages(),
            gates: vec![GateSpec::new(0, "Promote-To-Prod")],
        })
        .await
        .expect("approved run should succeed");

    assert!(report.is_success());
}

/// Denied approval: stage 2 never starts, its units are skipped, and the
/// stage-1 outputs stay recorded.
#[tokio::test]
async fn denied_gate_skips_later_stages() {
    let orchestrator = Orchestrator::new(
        seeded_store(),
        StaticExchange::new(),
        NoOpBackend,
        DenyingApprover,
    );

    let err = orchestrator
        .run(RunRequest {
            config: production_config(),
            assume_role_arn: None,
            units: layer_units(),
            stages: layer_stages(),
            gates: vec![GateSpec::new(0, "Promote-To-Prod")],
        })
        .await
        .expect_err("denied gate should fail the run");

    assert!(matches!(err, Error::GateDeclined { label } if label == "Promote-To-Prod"));
}

/// An unanswered gate with an operator timeout fails with GateTimeout
/// instead of hanging; stage 2 never starts.
#[tokio::test]
async fn unanswered_gate_times_out() {
    // No decision is ever recorded for the label.
    let orchestrator = Orchestrator::new(
        seeded_store(),
        StaticExchange::new(),
        NoOpBackend,
        QueuedApprover::new(),
    )
    .gate_timeout(Duration::from_millis(50));

    let err = orchestrator
        .run(RunRequest {
            config: production_config(),
            assume_role_arn: None,
            units: layer_units(),
            stages: layer_stages(),
            gates: vec![GateSpec::new(0, "Promote-To-Prod")],
        })
        .await
        .expect_err("unanswered gate should time out");

    assert!(matches!(err, Error::GateTimeout { label } if label == "Promote-To-Prod"));
}

/// Consumer1 fails while Consumer2 succeeds: the report names Consumer1,
/// the layer's and Consumer2's outputs remain recorded, and nothing later
/// starts.
#[tokio::test]
async fn partial_wave_failure_preserves_completed_outputs() {
    let backend = FailingBackend::new().fail_unit(
        "cognito",
        UnitError::new(UnitErrorCategory::Backend, "user pool quota exceeded"),
    );
    let orchestrator =
        Orchestrator::new(seeded_store(), StaticExchange::new(), backend, AutoApprover);

    let mut units = layer_units();
    // A third stage would run after the consumers; it must never start.
    units.push(UnitSpec::new("edge-domain", "frontend").depends_on("amplify"));

    let report = orchestrator
        .run(RunRequest {
            config: production_config(),
            assume_role_arn: None,
            units,
            stages: vec![
                StageSpec::new("backend-layer", vec![UnitId::new("auth-layer")]),
                StageSpec::new(
                    "deploy",
                    vec![UnitId::new("cognito"), UnitId::new("amplify")],
                ),
                StageSpec::new("edge", vec![UnitId::new("edge-domain")]),
            ],
            gates: Vec::new(),
        })
        .await
        .expect("unit failure is reported, not returned as an error");

    assert_eq!(report.run.state, RunState::Failed);

    let failed = report.failed_unit.expect("report should name the failed unit");
    assert_eq!(failed.unit_id, UnitId::new("cognito"));
    assert_eq!(failed.error.message, "user pool quota exceeded");

    // The layer's output survived the failure.
    let layer = report.run.execution(&UnitId::new("auth-layer")).unwrap();
    assert_eq!(layer.state, UnitState::Succeeded);
    assert_eq!(
        layer.output(&OutputName::new("layerArn")),
        Some("auth-layer::layerArn")
    );

    // The sibling in the same wave finished and kept its outputs.
    let amplify = report.run.execution(&UnitId::new("amplify")).unwrap();
    assert_eq!(amplify.state, UnitState::Succeeded);

    // The following stage never started.
    let edge = report.run.execution(&UnitId::new("edge-domain")).unwrap();
    assert_eq!(edge.state, UnitState::Skipped);
}

/// Inputs reaching the backend are the producer's recorded outputs.
#[tokio::test]
async fn consumers_receive_propagated_inputs() {
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use convoy_flow::backend::{DeployBackend, DeployContext, DeployOutcome};

    /// Records the inputs each unit was dispatched with.
    #[derive(Debug, Default)]
    struct RecordingBackend {
        seen: Mutex<BTreeMap<String, BTreeMap<OutputName, String>>>,
    }

    #[async_trait]
    impl DeployBackend for RecordingBackend {
        async fn deploy(
            &self,
            context: &DeployContext,
            unit: &UnitSpec,
            inputs: &BTreeMap<OutputName, String>,
        ) -> DeployOutcome {
            self.seen
                .lock()
                .unwrap()
                .insert(unit.id.to_string(), inputs.clone());
            NoOpBackend.deploy(context, unit, inputs).await
        }
    }

    let backend = Arc::new(RecordingBackend::default());

    #[derive(Debug)]
    struct Shared(Arc<RecordingBackend>);

    #[async_trait]
    impl DeployBackend for Shared {
        async fn deploy(
            &self,
            context: &DeployContext,
            unit: &UnitSpec,
            inputs: &BTreeMap<OutputName, String>,
        ) -> DeployOutcome {
            self.0.deploy(context, unit, inputs).await
        }
    }

    let orchestrator = Orchestrator::new(
        seeded_store(),
        StaticExchange::new(),
        Shared(Arc::clone(&backend)),
        AutoApprover,
    );

    orchestrator
        .run(RunRequest {
            config: production_config(),
            assume_role_arn: None,
            units: layer_units(),
            stages: layer_stages(),
            gates: Vec::new(),
        })
        .await
        .expect("run should succeed");

    let seen = backend.seen.lock().unwrap();
    assert!(seen["auth-layer"].is_empty());
    assert_eq!(
        seen["cognito"][&OutputName::new("layerArn")],
        "auth-layer::layerArn"
    );
    assert_eq!(
        seen["amplify"][&OutputName::new("layerArn")],
        "auth-layer::layerArn"
    );
}

/// Cancelling while the first stage's wave is in flight lets that wave
/// finish naturally and prevents every later stage from starting.
#[tokio::test]
async fn cancellation_lets_inflight_wave_finish() {
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use convoy_flow::backend::{DeployBackend, DeployContext, DeployOutcome};
    use convoy_flow::orchestrator::CancelHandle;

    /// Cancels the run from inside the first deploy call, then completes.
    #[derive(Debug, Default)]
    struct CancellingBackend {
        handle: Mutex<Option<CancelHandle>>,
    }

    #[async_trait]
    impl DeployBackend for CancellingBackend {
        async fn deploy(
            &self,
            context: &DeployContext,
            unit: &UnitSpec,
            inputs: &BTreeMap<OutputName, String>,
        ) -> DeployOutcome {
            if let Some(handle) = self.handle.lock().unwrap().as_ref() {
                handle.cancel();
            }
            NoOpBackend.deploy(context, unit, inputs).await
        }
    }

    #[derive(Debug)]
    struct Shared(Arc<CancellingBackend>);

    #[async_trait]
    impl DeployBackend for Shared {
        async fn deploy(
            &self,
            context: &DeployContext,
            unit: &UnitSpec,
            inputs: &BTreeMap<OutputName, String>,
        ) -> DeployOutcome {
            self.0.deploy(context, unit, inputs).await
        }
    }

    let backend = Arc::new(CancellingBackend::default());
    let orchestrator = Orchestrator::new(
        seeded_store(),
        StaticExchange::new(),
        Shared(Arc::clone(&backend)),
        AutoApprover,
    );
    *backend.handle.lock().unwrap() = Some(orchestrator.cancel_handle());

    let report = orchestrator
        .run(RunRequest {
            config: production_config(),
            assume_role_arn: None,
            units: layer_units(),
            stages: layer_stages(),
            gates: Vec::new(),
        })
        .await
        .expect("cancelled run returns a report");

    assert_eq!(report.run.state, RunState::Cancelled);
    // The in-flight layer finished and kept its output.
    let layer = report.run.execution(&UnitId::new("auth-layer")).unwrap();
    assert_eq!(layer.state, UnitState::Succeeded);
    // The consumer stage never started.
    assert_eq!(report.run.units_skipped(), 2);
}
