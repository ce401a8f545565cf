use bastion_core::{CandidateId, SignalStateKind};
use bastion_ledger::LedgerError;
use bastion_oracle::OracleError;
use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SignalError {
    #[error("Unknown candidate: {0}")]
    UnknownCandidate(CandidateId),

    #[error("Candidate already registered: {0}")]
    AlreadyRegistered(CandidateId),

    #[error("Confidence {0} outside [0, 1]")]
    InvalidConfidence(Decimal),

    #[error("Invalid transition for {candidate_id}: {from} -> {to}")]
    InvalidTransition {
        candidate_id: CandidateId,
        from: SignalStateKind,
        to: SignalStateKind,
    },

    #[error("Context unavailable for {candidate_id} (snapshot age: {age_secs:?}s)")]
    ContextUnavailable {
        candidate_id: CandidateId,
        age_secs: Option<i64>,
    },

    #[error("Context insufficient for {candidate_id}: confidence {confidence} not above {floor}")]
    ContextInsufficient {
        candidate_id: CandidateId,
        confidence: Decimal,
        floor: Decimal,
    },

    #[error("Cooling dwell not elapsed for {candidate_id}: {elapsed}/{required} cycles")]
    DwellNotElapsed {
        candidate_id: CandidateId,
        elapsed: u32,
        required: u32,
    },

    #[error("Oracle error: {0}")]
    Oracle(OracleError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),
}

impl SignalError {
    /// Map an oracle refusal onto the candidate it blocked.
    pub(crate) fn from_oracle(candidate_id: &CandidateId, err: OracleError) -> Self {
        match err {
            OracleError::ContextUnavailable { age_secs } => Self::ContextUnavailable {
                candidate_id: candidate_id.clone(),
                age_secs,
            },
            OracleError::ContextInsufficient { confidence, floor } => Self::ContextInsufficient {
                candidate_id: candidate_id.clone(),
                confidence,
                floor,
            },
            other => Self::Oracle(other),
        }
    }

    #[must_use]
    pub fn is_human_intervention_required(&self) -> bool {
        match self {
            Self::ContextUnavailable { .. } => true,
            Self::Ledger(e) => e.is_human_intervention_required(),
            _ => false,
        }
    }
}

pub type SignalResult<T> = Result<T, SignalError>;
