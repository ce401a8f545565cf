//! Prometheus metrics for bastion.
//!
//! Covers:
//! - Ledger appends, CAS conflicts, immutability violations, chain breaks
//! - Attestations by role
//! - Gate transitions by stage and outcome
//! - Oracle status and snapshot age
//! - Signal transitions
//! - Promotion pipeline outcomes, rate limiting, SLA, drift
//! - Escalations
//!
//! # Panics
//!
//! Metric registration uses `unwrap()` intentionally. If registration fails,
//! it indicates a fatal configuration error (e.g., duplicate metric names)
//! that should cause an immediate crash at startup rather than silent failure.
//! These panics only occur during static initialization, never at runtime.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_gauge, register_histogram_vec, register_int_gauge,
    CounterVec, Encoder, Gauge, HistogramVec, IntGauge, TextEncoder,
};

use crate::error::{TelemetryError, TelemetryResult};

// =============================================================================
// Ledger
// =============================================================================

/// Total ledger appends.
pub static LEDGER_APPENDS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "bastion_ledger_appends_total",
        "Total ledger entries appended",
        &["scope"]
    )
    .unwrap()
});

/// Optimistic-concurrency conflicts on append (stale head).
pub static LEDGER_CONFLICTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "bastion_ledger_conflicts_total",
        "Total append attempts rejected for a stale chain head",
        &["scope"]
    )
    .unwrap()
});

/// Attempted mutations of committed entries.
pub static LEDGER_VIOLATIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "bastion_ledger_violations_total",
        "Total rejected attempts to rewrite or delete committed entries",
        &["scope", "attempt"]
    )
    .unwrap()
});

/// Chains halted after a failed verification.
pub static LEDGER_CHAINS_HALTED: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "bastion_ledger_chains_halted",
        "Number of chains halted pending manual investigation"
    )
    .unwrap()
});

// =============================================================================
// Attestation & gates
// =============================================================================

/// Attestations recorded by role.
pub static ATTESTATIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "bastion_attestations_total",
        "Total attestations recorded",
        &["role", "outcome"]
    )
    .unwrap()
});

/// Gate transitions by stage and outcome.
pub static GATE_TRANSITIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "bastion_gate_transitions_total",
        "Total gate lifecycle operations",
        &["operation", "stage", "outcome"]
    )
    .unwrap()
});

// =============================================================================
// Oracle
// =============================================================================

/// Oracle status level (0=operational, 1=degraded, 2=unavailable).
pub static CCO_STATUS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "bastion_cco_status",
        "Context coherence status (0=operational, 1=degraded, 2=unavailable)"
    )
    .unwrap()
});

/// Age of the active snapshot in seconds.
pub static CCO_SNAPSHOT_AGE_SECS: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!(
        "bastion_cco_snapshot_age_seconds",
        "Age of the active context snapshot in seconds"
    )
    .unwrap()
});

/// Active snapshot version.
pub static CCO_SNAPSHOT_VERSION: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "bastion_cco_snapshot_version",
        "Version of the active context snapshot"
    )
    .unwrap()
});

// =============================================================================
// Signals & promotion
// =============================================================================

/// Signal state transitions.
pub static SIGNAL_TRANSITIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "bastion_signal_transitions_total",
        "Total signal readiness transition attempts",
        &["from", "to", "outcome"]
    )
    .unwrap()
});

/// Promotion outcomes by mode.
pub static PROMOTIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "bastion_promotions_total",
        "Total promotion requests",
        &["mode", "outcome"]
    )
    .unwrap()
});

/// Per-stage pipeline latency in milliseconds.
pub static PIPELINE_STAGE_LATENCY_MS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "bastion_pipeline_stage_latency_ms",
        "Promotion pipeline stage latency in milliseconds",
        &["stage"],
        vec![1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 5000.0]
    )
    .unwrap()
});

/// SLA breaches by stage.
pub static SLA_BREACHES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "bastion_sla_breaches_total",
        "Total pipeline SLA ceiling breaches",
        &["stage"]
    )
    .unwrap()
});

/// Rolling drift quality score.
pub static DRIFT_SCORE: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!(
        "bastion_drift_score",
        "Rolling-window mean quality score"
    )
    .unwrap()
});

/// Pipeline paused flag (1 = paused).
pub static PIPELINE_PAUSED: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "bastion_pipeline_paused",
        "Promotion pipeline paused (1=paused)"
    )
    .unwrap()
});

/// Escalations raised.
pub static ESCALATIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "bastion_escalations_total",
        "Total escalation events raised",
        &["kind"]
    )
    .unwrap()
});

/// Metrics facade for easy access.
pub struct Metrics;

impl Metrics {
    pub fn ledger_append(scope: &str) {
        LEDGER_APPENDS_TOTAL.with_label_values(&[scope]).inc();
    }

    pub fn ledger_conflict(scope: &str) {
        LEDGER_CONFLICTS_TOTAL.with_label_values(&[scope]).inc();
    }

    pub fn ledger_violation(scope: &str, attempt: &str) {
        LEDGER_VIOLATIONS_TOTAL
            .with_label_values(&[scope, attempt])
            .inc();
    }

    pub fn chain_halted() {
        LEDGER_CHAINS_HALTED.inc();
    }

    pub fn chain_resumed() {
        LEDGER_CHAINS_HALTED.dec();
    }

    pub fn attestation(role: &str, outcome: &str) {
        ATTESTATIONS_TOTAL.with_label_values(&[role, outcome]).inc();
    }

    pub fn gate_transition(operation: &str, stage: &str, outcome: &str) {
        GATE_TRANSITIONS_TOTAL
            .with_label_values(&[operation, stage, outcome])
            .inc();
    }

    /// Set oracle status level and snapshot age.
    pub fn cco_status(level: u8, age_secs: f64) {
        CCO_STATUS.set(i64::from(level));
        CCO_SNAPSHOT_AGE_SECS.set(age_secs);
    }

    pub fn cco_snapshot_version(version: u64) {
        CCO_SNAPSHOT_VERSION.set(version as i64);
    }

    pub fn signal_transition(from: &str, to: &str, outcome: &str) {
        SIGNAL_TRANSITIONS_TOTAL
            .with_label_values(&[from, to, outcome])
            .inc();
    }

    pub fn promotion(mode: &str, outcome: &str) {
        PROMOTIONS_TOTAL.with_label_values(&[mode, outcome]).inc();
    }

    pub fn stage_latency(stage: &str, latency_ms: f64) {
        PIPELINE_STAGE_LATENCY_MS
            .with_label_values(&[stage])
            .observe(latency_ms);
    }

    pub fn sla_breach(stage: &str) {
        SLA_BREACHES_TOTAL.with_label_values(&[stage]).inc();
    }

    pub fn drift_score(score: f64) {
        DRIFT_SCORE.set(score);
    }

    pub fn pipeline_paused(paused: bool) {
        PIPELINE_PAUSED.set(if paused { 1 } else { 0 });
    }

    pub fn escalation(kind: &str) {
        ESCALATIONS_TOTAL.with_label_values(&[kind]).inc();
    }

    /// Render all registered metrics in the Prometheus text format.
    pub fn render() -> TelemetryResult<String> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&prometheus::gather(), &mut buffer)
            .map_err(|e| TelemetryError::Metrics(e.to_string()))?;
        String::from_utf8(buffer).map_err(|e| TelemetryError::Metrics(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_contains_recorded_metric() {
        Metrics::gate_transition("advance", "LIVE", "ok");
        let text = Metrics::render().unwrap();
        assert!(text.contains("bastion_gate_transitions_total"));
    }

    #[test]
    fn test_pipeline_paused_flag() {
        Metrics::pipeline_paused(true);
        assert_eq!(PIPELINE_PAUSED.get(), 1);
        Metrics::pipeline_paused(false);
        assert_eq!(PIPELINE_PAUSED.get(), 0);
    }
}
