//! Active snapshot holder and coherence evaluation.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use bastion_core::{
    Clock, CoherenceStatus, ContextSnapshot, EscalationEvent, EscalationKind, EscalationSink,
    Severity,
};
use bastion_telemetry::Metrics;
use chrono::{DateTime, Duration, Utc};
use parking_lot::{Mutex, RwLock};
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::config::OracleConfig;
use crate::error::{OracleError, OracleResult};
use crate::observer::SnapshotObserver;

/// A snapshot as activated, numbered in activation order from 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionedSnapshot {
    pub version: u64,
    pub snapshot: ContextSnapshot,
    pub activated_at: DateTime<Utc>,
}

/// Result of a coherence evaluation. `permitted` is false only when
/// UNAVAILABLE; DEGRADED still permits candidates above the floor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CoherenceReport {
    pub status: CoherenceStatus,
    pub version: Option<u64>,
    pub age_secs: Option<i64>,
    pub permitted: bool,
    pub reason: String,
}

/// Freshness classification of a snapshot of age `age`.
///
/// `None` (no snapshot) is UNAVAILABLE.
#[must_use]
pub fn classify(age: Option<Duration>, fresh: Duration, stale: Duration) -> CoherenceStatus {
    match age {
        Some(age) if age <= fresh => CoherenceStatus::Operational,
        Some(age) if age <= stale => CoherenceStatus::Degraded,
        _ => CoherenceStatus::Unavailable,
    }
}

pub struct ContextOracle {
    config: OracleConfig,
    clock: Arc<dyn Clock>,
    escalation: Arc<dyn EscalationSink>,
    observer: Option<Arc<dyn SnapshotObserver>>,
    active: RwLock<Option<Arc<VersionedSnapshot>>>,
    /// Serializes refreshes so versions and observer calls stay ordered.
    refresh_lock: Mutex<()>,
    status_tx: watch::Sender<CoherenceStatus>,
}

impl ContextOracle {
    /// Create an oracle with no snapshot (UNAVAILABLE) and a receiver for
    /// status changes published by `poll_status`.
    #[must_use]
    pub fn new(
        config: OracleConfig,
        clock: Arc<dyn Clock>,
        escalation: Arc<dyn EscalationSink>,
    ) -> (Self, watch::Receiver<CoherenceStatus>) {
        let (status_tx, rx) = watch::channel(CoherenceStatus::Unavailable);
        let oracle = Self {
            config,
            clock,
            escalation,
            observer: None,
            active: RwLock::new(None),
            refresh_lock: Mutex::new(()),
            status_tx,
        };
        (oracle, rx)
    }

    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn SnapshotObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn config(&self) -> &OracleConfig {
        &self.config
    }

    pub fn subscribe(&self) -> watch::Receiver<CoherenceStatus> {
        self.status_tx.subscribe()
    }

    pub fn active_snapshot(&self) -> Option<Arc<VersionedSnapshot>> {
        self.active.read().clone()
    }

    /// Validate and activate `snapshot`.
    pub fn refresh(&self, snapshot: ContextSnapshot) -> OracleResult<Arc<VersionedSnapshot>> {
        let now = self.clock.now();
        snapshot.validate(now, Duration::seconds(self.config.max_future_skew_secs))?;

        let _guard = self.refresh_lock.lock();
        let previous = self.active_snapshot();
        if let Some(active) = &previous {
            if snapshot.captured_at < active.snapshot.captured_at {
                warn!(
                    captured_at = %snapshot.captured_at,
                    active = %active.snapshot.captured_at,
                    "Snapshot older than active one rejected"
                );
                return Err(OracleError::OutOfOrder {
                    captured_at: snapshot.captured_at,
                    active: active.snapshot.captured_at,
                });
            }
        }

        let versioned = Arc::new(VersionedSnapshot {
            version: previous.map_or(1, |p| p.version + 1),
            snapshot,
            activated_at: now,
        });
        if let Some(observer) = &self.observer {
            observer.on_refresh(&versioned)?;
        }
        *self.active.write() = Some(Arc::clone(&versioned));

        Metrics::cco_snapshot_version(versioned.version);
        info!(
            version = versioned.version,
            regime = %versioned.snapshot.regime,
            confidence = %versioned.snapshot.regime_confidence,
            volatility = %versioned.snapshot.volatility_state,
            liquidity = %versioned.snapshot.liquidity_state,
            "Context snapshot activated"
        );
        Ok(versioned)
    }

    /// Await `source` up to `deadline`, then refresh. Nothing is applied on
    /// timeout or source failure.
    pub async fn ingest<F>(
        &self,
        source: F,
        deadline: StdDuration,
    ) -> OracleResult<Arc<VersionedSnapshot>>
    where
        F: Future<Output = OracleResult<ContextSnapshot>>,
    {
        let snapshot = tokio::time::timeout(deadline, source)
            .await
            .map_err(|_| {
                warn!(deadline_ms = deadline.as_millis() as u64, "Snapshot ingestion timed out");
                OracleError::Timeout {
                    timeout_ms: deadline.as_millis() as u64,
                }
            })??;
        self.refresh(snapshot)
    }

    pub fn evaluate_coherence(&self) -> CoherenceReport {
        self.evaluate_coherence_at(self.clock.now())
    }

    /// Pure: reads the active snapshot and `now`, nothing else.
    pub fn evaluate_coherence_at(&self, now: DateTime<Utc>) -> CoherenceReport {
        let active = self.active_snapshot();
        let age = active.as_ref().map(|a| a.snapshot.age_at(now));
        let status = classify(
            age,
            Duration::seconds(self.config.fresh_secs),
            Duration::seconds(self.config.stale_secs),
        );
        let age_secs = age.map(|a| a.num_seconds());
        let reason = match (status, age_secs) {
            (_, None) => "no snapshot loaded".to_string(),
            (CoherenceStatus::Operational, Some(age)) => {
                format!("snapshot fresh ({age}s <= {}s)", self.config.fresh_secs)
            }
            (CoherenceStatus::Degraded, Some(age)) => format!(
                "snapshot aging ({age}s), confidence above {} required",
                self.config.degraded_confidence_floor
            ),
            (CoherenceStatus::Unavailable, Some(age)) => {
                format!("snapshot stale ({age}s > {}s)", self.config.stale_secs)
            }
        };
        CoherenceReport {
            status,
            version: active.map(|a| a.version),
            age_secs,
            permitted: status != CoherenceStatus::Unavailable,
            reason,
        }
    }

    /// Decide `confidence` against the current context without escalating.
    pub fn check_candidate_execution(&self, confidence: Decimal) -> OracleResult<CoherenceStatus> {
        Self::decide(&self.evaluate_coherence(), confidence, self.config.degraded_confidence_floor)
    }

    /// Whether a candidate with `confidence` may proceed under the current
    /// context. UNAVAILABLE raises an escalation.
    pub fn validate_candidate_execution(&self, confidence: Decimal) -> OracleResult<CoherenceStatus> {
        let report = self.evaluate_coherence();
        let decision = Self::decide(&report, confidence, self.config.degraded_confidence_floor);
        if matches!(decision, Err(OracleError::ContextUnavailable { .. })) {
            self.escalate_unavailable(&report, "candidate execution blocked");
        }
        decision
    }

    fn decide(
        report: &CoherenceReport,
        confidence: Decimal,
        floor: Decimal,
    ) -> OracleResult<CoherenceStatus> {
        match report.status {
            CoherenceStatus::Operational => Ok(report.status),
            CoherenceStatus::Degraded if confidence > floor => {
                debug!(%confidence, %floor, "Degraded context, confidence sufficient");
                Ok(report.status)
            }
            CoherenceStatus::Degraded => Err(OracleError::ContextInsufficient { confidence, floor }),
            CoherenceStatus::Unavailable => Err(OracleError::ContextUnavailable {
                age_secs: report.age_secs,
            }),
        }
    }

    /// Re-evaluate, update gauges and publish status changes. Entering
    /// UNAVAILABLE raises an escalation.
    pub fn poll_status(&self) -> CoherenceStatus {
        let report = self.evaluate_coherence();
        let status = report.status;
        Metrics::cco_status(
            status.level(),
            report.age_secs.map_or(-1.0, |a| a as f64),
        );

        let mut previous = status;
        let changed = self.status_tx.send_if_modified(|current| {
            previous = *current;
            *current = status;
            previous != status
        });
        if changed {
            match status {
                CoherenceStatus::Operational => info!(status = %status, from = %previous, "Context coherence changed"),
                CoherenceStatus::Degraded => warn!(status = %status, from = %previous, age_secs = ?report.age_secs, "Context coherence changed"),
                CoherenceStatus::Unavailable => {
                    self.escalate_unavailable(&report, "oracle entered UNAVAILABLE");
                }
            }
        }
        status
    }

    fn escalate_unavailable(&self, report: &CoherenceReport, detail: &str) {
        error!(
            age_secs = ?report.age_secs,
            version = ?report.version,
            "CONTEXT UNAVAILABLE - {detail}"
        );
        Metrics::escalation(EscalationKind::ContextUnavailable.as_str());
        self.escalation.escalate(EscalationEvent::new(
            EscalationKind::ContextUnavailable,
            Severity::Critical,
            "oracle",
            format!("{detail} (snapshot age {:?}s)", report.age_secs),
            self.clock.now(),
        ));
    }
}
