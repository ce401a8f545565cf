use std::collections::BTreeMap;

use bastion_core::Stage;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

fn default_hourly_cap() -> u32 {
    50
}

fn default_shadow_window_secs() -> i64 {
    86_400
}

fn default_min_reviewed_decisions() -> u32 {
    20
}

fn default_required_stage() -> Stage {
    Stage::Live
}

fn default_drift_window() -> usize {
    50
}

fn default_drift_min_samples() -> usize {
    10
}

fn default_drift_floor() -> Decimal {
    Decimal::new(55, 2)
}

fn default_sla_ceilings_ms() -> BTreeMap<String, u64> {
    BTreeMap::from([
        ("gate_validation".to_string(), 5_000),
        ("promotion".to_string(), 2_000),
    ])
}

fn default_sla_breach_limit() -> u32 {
    3
}

fn default_rollback_window_secs() -> i64 {
    3_600
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Promotion attempts admitted per clock hour, shadow ones included.
    #[serde(default = "default_hourly_cap")]
    pub hourly_cap: u32,
    #[serde(default = "default_shadow_window_secs")]
    pub shadow_window_secs: i64,
    /// Reviewed shadow decisions needed before the first ramp step.
    #[serde(default = "default_min_reviewed_decisions")]
    pub min_reviewed_decisions: u32,
    /// Gate stage a candidate's artifact must have reached.
    #[serde(default = "default_required_stage")]
    pub required_stage: Stage,
    /// Quality samples kept in the rolling window.
    #[serde(default = "default_drift_window")]
    pub drift_window: usize,
    /// No drift verdict is given below this many samples.
    #[serde(default = "default_drift_min_samples")]
    pub drift_min_samples: usize,
    #[serde(default = "default_drift_floor")]
    pub drift_floor: Decimal,
    /// Per-stage latency ceilings in milliseconds.
    #[serde(default = "default_sla_ceilings_ms")]
    pub sla_ceilings_ms: BTreeMap<String, u64>,
    /// Consecutive breaches that pause the pipeline.
    #[serde(default = "default_sla_breach_limit")]
    pub sla_breach_limit: u32,
    #[serde(default = "default_rollback_window_secs")]
    pub rollback_window_secs: i64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            hourly_cap: default_hourly_cap(),
            shadow_window_secs: default_shadow_window_secs(),
            min_reviewed_decisions: default_min_reviewed_decisions(),
            required_stage: default_required_stage(),
            drift_window: default_drift_window(),
            drift_min_samples: default_drift_min_samples(),
            drift_floor: default_drift_floor(),
            sla_ceilings_ms: default_sla_ceilings_ms(),
            sla_breach_limit: default_sla_breach_limit(),
            rollback_window_secs: default_rollback_window_secs(),
        }
    }
}
