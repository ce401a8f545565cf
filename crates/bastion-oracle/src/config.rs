use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

fn default_fresh_secs() -> i64 {
    15
}

fn default_stale_secs() -> i64 {
    300
}

fn default_degraded_confidence_floor() -> Decimal {
    Decimal::new(70, 2)
}

fn default_max_future_skew_secs() -> i64 {
    5
}

fn default_ingest_timeout_ms() -> u64 {
    2_000
}

fn default_poll_interval_ms() -> u64 {
    1_000
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleConfig {
    /// Snapshot age (seconds) up to which the oracle is OPERATIONAL.
    #[serde(default = "default_fresh_secs")]
    pub fresh_secs: i64,
    /// Snapshot age (seconds) up to which the oracle is DEGRADED.
    #[serde(default = "default_stale_secs")]
    pub stale_secs: i64,
    /// While DEGRADED, candidates need confidence strictly above this.
    #[serde(default = "default_degraded_confidence_floor")]
    pub degraded_confidence_floor: Decimal,
    /// How far ahead of local time `captured_at` may be.
    #[serde(default = "default_max_future_skew_secs")]
    pub max_future_skew_secs: i64,
    #[serde(default = "default_ingest_timeout_ms")]
    pub ingest_timeout_ms: u64,
    /// Watchdog cadence for status publication.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            fresh_secs: default_fresh_secs(),
            stale_secs: default_stale_secs(),
            degraded_confidence_floor: default_degraded_confidence_floor(),
            max_future_skew_secs: default_max_future_skew_secs(),
            ingest_timeout_ms: default_ingest_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}
