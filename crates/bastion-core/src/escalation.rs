//! Structured escalation events for the external alerting system.
//!
//! Engines raise events through [`EscalationSink`]; the server hands the
//! receiving end of a [`ChannelEscalationSink`] to whatever forwards alerts
//! to on-call tooling.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{error, warn};
use uuid::Uuid;

/// What triggered the escalation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationKind {
    /// Oracle entered UNAVAILABLE; all dependent executions are blocked.
    ContextUnavailable,
    /// Rolling quality score fell below the drift floor.
    DriftBreach,
    /// Consecutive SLA breaches paused the promotion pipeline.
    SlaBreach,
    /// Ledger verification found a broken hash chain.
    ChainBroken,
}

impl EscalationKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ContextUnavailable => "context_unavailable",
            Self::DriftBreach => "drift_breach",
            Self::SlaBreach => "sla_breach",
            Self::ChainBroken => "chain_broken",
        }
    }
}

impl fmt::Display for EscalationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Warning,
    Critical,
}

/// One escalation for on-call consumption.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationEvent {
    pub id: Uuid,
    pub kind: EscalationKind,
    pub severity: Severity,
    /// Component that raised the event (e.g. `oracle`, `pipeline`).
    pub source: String,
    pub detail: String,
    /// Hard halts are never retried automatically.
    pub requires_human: bool,
    pub raised_at: DateTime<Utc>,
}

impl EscalationEvent {
    pub fn new(
        kind: EscalationKind,
        severity: Severity,
        source: impl Into<String>,
        detail: impl Into<String>,
        raised_at: DateTime<Utc>,
    ) -> Self {
        let requires_human = matches!(
            kind,
            EscalationKind::ContextUnavailable | EscalationKind::ChainBroken
        ) || severity == Severity::Critical;
        Self {
            id: Uuid::new_v4(),
            kind,
            severity,
            source: source.into(),
            detail: detail.into(),
            requires_human,
            raised_at,
        }
    }
}

/// Destination for escalation events.
pub trait EscalationSink: Send + Sync {
    fn escalate(&self, event: EscalationEvent);
}

/// Sink that only writes structured logs.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogEscalationSink;

impl EscalationSink for LogEscalationSink {
    fn escalate(&self, event: EscalationEvent) {
        log_event(&event);
    }
}

/// Sink that logs and forwards events over an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelEscalationSink {
    tx: mpsc::UnboundedSender<EscalationEvent>,
}

impl ChannelEscalationSink {
    /// Create the sink and the receiver for the forwarding task.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<EscalationEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EscalationSink for ChannelEscalationSink {
    fn escalate(&self, event: EscalationEvent) {
        log_event(&event);
        if self.tx.send(event).is_err() {
            warn!("Escalation receiver dropped, event only logged");
        }
    }
}

fn log_event(event: &EscalationEvent) {
    error!(
        id = %event.id,
        kind = %event.kind,
        source = %event.source,
        requires_human = event.requires_human,
        detail = %event.detail,
        "ESCALATION"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hard_halts_require_human() {
        let now = Utc::now();
        let unavailable = EscalationEvent::new(
            EscalationKind::ContextUnavailable,
            Severity::Warning,
            "oracle",
            "stale",
            now,
        );
        assert!(unavailable.requires_human);

        let drift = EscalationEvent::new(
            EscalationKind::DriftBreach,
            Severity::Warning,
            "pipeline",
            "score below floor",
            now,
        );
        assert!(!drift.requires_human);
    }

    #[tokio::test]
    async fn test_channel_sink_forwards() {
        let (sink, mut rx) = ChannelEscalationSink::new();
        sink.escalate(EscalationEvent::new(
            EscalationKind::SlaBreach,
            Severity::Critical,
            "pipeline",
            "3 consecutive breaches",
            Utc::now(),
        ));

        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind, EscalationKind::SlaBreach);
        assert!(event.requires_human);
    }
}
