use bastion_core::{ArtifactId, CandidateId, Stage};
use bastion_gate::GateError;
use bastion_ledger::LedgerError;
use bastion_signal::SignalError;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::pipeline::PauseReason;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Hourly cap reached; callers should defer until `retry_at`.
    #[error("Promotion rate limit of {cap}/hour reached; next bucket starts at {retry_at}")]
    RateLimitExceeded { cap: u32, retry_at: DateTime<Utc> },

    #[error("Pipeline paused ({reason})")]
    Paused { reason: PauseReason },

    #[error("Pipeline is not paused")]
    NotPaused,

    #[error("Artifact {artifact_id} at {stage} has not reached {required}")]
    NotQualified {
        artifact_id: ArtifactId,
        stage: Stage,
        required: Stage,
    },

    #[error("Shadow window open until {until}")]
    ShadowWindowOpen { until: DateTime<Utc> },

    #[error("Only {reviewed} of {required} shadow decisions reviewed")]
    InsufficientReviews { reviewed: u32, required: u32 },

    #[error("Ramp already at 100%")]
    FullyRamped,

    #[error("Unknown shadow decision: {0}")]
    UnknownDecision(Uuid),

    #[error("Shadow decision {0} already reviewed")]
    AlreadyReviewed(Uuid),

    #[error("No promotion recorded for {0}")]
    UnknownPromotion(CandidateId),

    #[error("Promotion of {0} already reverted")]
    AlreadyReverted(CandidateId),

    /// Past this point reversal needs the gate's dual-signoff rollback.
    #[error("Rollback window for {candidate_id} closed at {expired_at}")]
    RollbackWindowExpired {
        candidate_id: CandidateId,
        expired_at: DateTime<Utc>,
    },

    #[error("No SLA ceiling configured for stage {0}")]
    UnknownSlaStage(String),

    #[error("Gate error: {0}")]
    Gate(#[from] GateError),

    #[error("Signal error: {0}")]
    Signal(#[from] SignalError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),
}

impl PipelineError {
    /// Whether the same request may succeed later without intervention.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimitExceeded { .. })
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;
