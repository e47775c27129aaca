//! Error types for the deployment orchestration domain.

use crate::unit::{OutputName, UnitId};

/// The result type used throughout convoy-flow.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in orchestration operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A cycle was detected in the dependency graph.
    #[error("cycle detected in dependency graph: {cycle:?}")]
    CycleDetected {
        /// The cycle path (unit ids in dependency order).
        cycle: Vec<String>,
    },

    /// A consumed output is never produced by any declared unit.
    #[error("unit {unit} consumes {output} from {producer}, which no declared unit produces")]
    UnresolvedReference {
        /// The consuming unit.
        unit: UnitId,
        /// The producer the binding names.
        producer: UnitId,
        /// The consumed output name.
        output: OutputName,
    },

    /// Two units were declared with the same id.
    #[error("duplicate unit id: {unit}")]
    DuplicateUnit {
        /// The duplicated unit id.
        unit: UnitId,
    },

    /// A unit was not found in the graph or plan.
    #[error("unit not found: {unit}")]
    UnitNotFound {
        /// The unit id that was not found.
        unit: UnitId,
    },

    /// A unit was declared against an account slot the build configuration
    /// does not define.
    #[error("unit {unit} targets unknown account slot '{slot}'")]
    UnknownAccountSlot {
        /// The unit with the bad declaration.
        unit: UnitId,
        /// The undeclared slot name.
        slot: String,
    },

    /// An invalid state transition was attempted.
    #[error("invalid state transition: {from} -> {to} ({reason})")]
    InvalidStateTransition {
        /// The current state.
        from: String,
        /// The attempted target state.
        to: String,
        /// The reason the transition is invalid.
        reason: String,
    },

    /// Plan generation failed.
    #[error("plan generation failed: {message}")]
    PlanGeneration {
        /// Description of the failure.
        message: String,
    },

    /// A unit's execution failed.
    #[error("unit {unit} failed: {message}")]
    UnitExecutionFailed {
        /// The failed unit.
        unit: UnitId,
        /// Description of the failure.
        message: String,
    },

    /// A consumer was dispatched before its producer's output was recorded.
    ///
    /// The wave barrier makes this unreachable for valid plans; hitting it
    /// indicates a scheduling invariant was broken.
    #[error("unit {unit} needs output {output} from {producer}, but it was never recorded")]
    UnresolvedOutput {
        /// The consuming unit.
        unit: UnitId,
        /// The producer the binding names.
        producer: UnitId,
        /// The consumed output name.
        output: OutputName,
    },

    /// An approval gate timed out before a decision was recorded.
    #[error("gate '{label}' timed out awaiting approval")]
    GateTimeout {
        /// The gate's approval label.
        label: String,
    },

    /// An approval gate was explicitly declined.
    #[error("gate '{label}' was declined")]
    GateDeclined {
        /// The gate's approval label.
        label: String,
    },

    /// A DAG node was not found (internal graph operation error).
    #[error("DAG node not found: {node}")]
    DagNodeNotFound {
        /// The node identifier (index or value).
        node: String,
    },

    /// An error from configuration resolution.
    #[error("configuration error: {0}")]
    Params(#[from] convoy_params::Error),

    /// An error from convoy-core.
    #[error("core error: {0}")]
    Core(#[from] convoy_core::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_error_display() {
        let err = Error::CycleDetected {
            cycle: vec!["a".into(), "b".into(), "a".into()],
        };
        assert!(err.to_string().contains("cycle detected"));
    }

    #[test]
    fn unresolved_reference_names_all_three_parties() {
        let err = Error::UnresolvedReference {
            unit: UnitId::new("consumer"),
            producer: UnitId::new("layer"),
            output: OutputName::new("layerArn"),
        };
        let msg = err.to_string();
        assert!(msg.contains("consumer"));
        assert!(msg.contains("layer"));
        assert!(msg.contains("layerArn"));
    }

    #[test]
    fn params_error_converts() {
        let err: Error = convoy_params::Error::MissingParameters {
            paths: vec!["/a".into()],
        }
        .into();
        assert!(matches!(err, Error::Params(_)));
    }
}
