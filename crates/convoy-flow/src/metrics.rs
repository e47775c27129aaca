//! Observability metrics for orchestration.
//!
//! Metrics are exposed through the `metrics` crate facade; the embedding
//! process decides how (and whether) to export them.
//!
//! ## Metrics Exported
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `convoy_flow_runs_total` | Counter | `outcome` | Completed runs by outcome |
//! | `convoy_flow_units_total` | Counter | `from_state`, `to_state` | Unit state transitions |
//! | `convoy_flow_wave_duration_seconds` | Histogram | - | Wall time per wave |
//! | `convoy_flow_gate_wait_seconds` | Histogram | `label` | Time spent awaiting approvals |
//! | `convoy_flow_active_runs` | Gauge | - | Currently executing runs |

use metrics::{counter, gauge, histogram};

/// Metric names as constants for consistency.
pub mod names {
    /// Counter: Completed runs by outcome.
    pub const RUNS_TOTAL: &str = "convoy_flow_runs_total";
    /// Counter: Unit state transitions.
    pub const UNITS_TOTAL: &str = "convoy_flow_units_total";
    /// Histogram: Wall time per wave in seconds.
    pub const WAVE_DURATION_SECONDS: &str = "convoy_flow_wave_duration_seconds";
    /// Histogram: Time spent awaiting gate approvals in seconds.
    pub const GATE_WAIT_SECONDS: &str = "convoy_flow_gate_wait_seconds";
    /// Gauge: Currently executing runs.
    pub const ACTIVE_RUNS: &str = "convoy_flow_active_runs";
}

/// Label keys used across metrics.
pub mod labels {
    /// Run outcome (succeeded, failed, cancelled).
    pub const OUTCOME: &str = "outcome";
    /// Previous unit state (for transitions).
    pub const FROM_STATE: &str = "from_state";
    /// Target unit state (for transitions).
    pub const TO_STATE: &str = "to_state";
    /// Gate label.
    pub const LABEL: &str = "label";
}

/// High-level interface for recording orchestration metrics.
///
/// Cheap to clone and share across tasks.
#[derive(Debug, Clone, Default)]
pub struct FlowMetrics;

impl FlowMetrics {
    /// Creates a new metrics recorder.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Records a completed run by outcome label.
    pub fn record_run(&self, outcome: &str) {
        counter!(names::RUNS_TOTAL, labels::OUTCOME => outcome.to_string()).increment(1);
    }

    /// Records a unit state transition.
    pub fn record_unit_transition(&self, from_state: &str, to_state: &str) {
        counter!(
            names::UNITS_TOTAL,
            labels::FROM_STATE => from_state.to_string(),
            labels::TO_STATE => to_state.to_string(),
        )
        .increment(1);
    }

    /// Observes one wave's wall-clock duration.
    pub fn observe_wave_duration(&self, seconds: f64) {
        histogram!(names::WAVE_DURATION_SECONDS).record(seconds);
    }

    /// Observes the time spent waiting on one gate.
    pub fn observe_gate_wait(&self, label: &str, seconds: f64) {
        histogram!(names::GATE_WAIT_SECONDS, labels::LABEL => label.to_string()).record(seconds);
    }

    /// Updates the active-runs gauge.
    #[allow(clippy::cast_precision_loss)] // Gauge values are typically small
    pub fn set_active_runs(&self, count: usize) {
        gauge!(names::ACTIVE_RUNS).set(count as f64);
    }
}
