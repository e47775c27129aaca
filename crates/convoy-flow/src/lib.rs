//! # convoy-flow
//!
//! Deployment orchestration engine for Convoy.
//!
//! This crate implements the deployment domain, providing:
//!
//! - **Declared Dependencies**: Every producer/consumer relationship is a
//!   named binding, making ordering and cycles statically checkable
//! - **Deterministic Planning**: Reproducible stage/wave partitions from
//!   unit declarations and grouping hints
//! - **Gated Execution**: Manual-approval barriers between stages, with
//!   operator-controlled timeouts
//! - **Output Propagation**: Producer outputs flow to consumers across
//!   wave barriers, written exactly once
//!
//! ## Core Concepts
//!
//! - **Unit**: An atomic, account/region-scoped deployment operation with
//!   declared inputs and outputs
//! - **Wave**: A set of mutually independent units eligible to run
//!   concurrently
//! - **Stage**: An ordered group of waves; stages execute strictly
//!   sequentially
//! - **Gate**: A manual-approval barrier a stage waits on before starting
//!
//! ## Guarantees
//!
//! - **Deterministic**: The same graph, stage hints, and gate specs always
//!   produce the same plan (identical fingerprints)
//! - **No partial configuration**: A run never reaches graph building with
//!   an incomplete configuration
//! - **No silent retries**: Failures abort the run with full context;
//!   retries belong to the deployment backend
//!
//! ## Example
//!
//! ```rust
//! use convoy_flow::graph::DependencyGraph;
//! use convoy_flow::plan::{GateSpec, StageSpec};
//! use convoy_flow::scheduler::WaveScheduler;
//! use convoy_flow::unit::{UnitId, UnitSpec};
//!
//! # fn main() -> convoy_flow::error::Result<()> {
//! let graph = DependencyGraph::build(vec![
//!     UnitSpec::new("auth-layer", "backend").produces("layerArn"),
//!     UnitSpec::new("cognito", "backend").consumes(("auth-layer", "layerArn")),
//! ])?;
//!
//! let stages = [
//!     StageSpec::new("backend-layer", vec![UnitId::new("auth-layer")]),
//!     StageSpec::new("deploy", vec![UnitId::new("cognito")]),
//! ];
//! let gates = [GateSpec::new(0, "Promote-To-Prod")];
//!
//! let plan = WaveScheduler::new().plan(&graph, &stages, &gates, "production")?;
//! assert_eq!(plan.stages.len(), 2);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

// Internal module - not exposed in public API.
pub(crate) mod dag;

pub mod backend;
pub mod error;
pub mod graph;
pub mod metrics;
pub mod orchestrator;
pub mod plan;
pub mod run;
pub mod scheduler;
pub mod unit;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::backend::{
        Approval, ApprovalChannel, DeployBackend, DeployContext, DeployOutcome,
    };
    pub use crate::error::{Error, Result};
    pub use crate::graph::DependencyGraph;
    pub use crate::metrics::FlowMetrics;
    pub use crate::orchestrator::{CancelHandle, Orchestrator, RunRequest};
    pub use crate::plan::{ExecutionPlan, GateLabel, GateSpec, Stage, StageSpec, Wave};
    pub use crate::run::{FailedUnit, Run, RunReport, RunState};
    pub use crate::scheduler::WaveScheduler;
    pub use crate::unit::{
        Binding, OutputName, UnitError, UnitExecution, UnitId, UnitSpec, UnitState,
    };
}
