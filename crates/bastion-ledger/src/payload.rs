//! Typed ledger payloads.
//!
//! The payload set is closed: engines record only these events. Custom
//! payloads exist for external collaborators and carry an opaque JSON body.
//!
//! Payloads must serialize deterministically. Use `Vec`/`BTreeMap`, never
//! `HashMap`, inside any variant.

use bastion_core::{
    ArtifactId, ArtifactKind, CandidateId, ContextSnapshot, Digest, EscalationKind, EvidenceRef,
    SignalStateKind, SignerIdentity, SignerRole, Stage,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entry::{ChainId, EntryId};

/// How a parameter change was authorized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangePathway {
    /// Owner authority, applied directly.
    Direct,
    /// Owner + governance attestation.
    DualSignoff,
    /// Bounded sub-gate for locked artifacts.
    Recalibration,
}

impl ChangePathway {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::DualSignoff => "dual_signoff",
            Self::Recalibration => "recalibration",
        }
    }
}

/// Promotion pipeline lifecycle events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineEventKind {
    Paused,
    Resumed,
    RampAdvanced,
    SlaBreach,
    DriftBreach,
    ShadowReviewed,
}

/// Event recorded by a ledger entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EntryPayload {
    // ------------------------------------------------------------------
    // Gate lifecycle
    // ------------------------------------------------------------------
    ArtifactRegistered {
        artifact_id: ArtifactId,
        kind: ArtifactKind,
        owner: SignerIdentity,
    },
    GateSubmission {
        artifact_id: ArtifactId,
        kind: ArtifactKind,
        from_stage: Stage,
        target_stage: Stage,
        evidence: Vec<EvidenceRef>,
        required_roles: Vec<SignerRole>,
    },
    GateAdvanced {
        artifact_id: ArtifactId,
        from_stage: Stage,
        to_stage: Stage,
        submission: EntryId,
    },
    GateRejected {
        artifact_id: ArtifactId,
        stage: Stage,
        operation: String,
        reason: String,
    },
    RollbackRequested {
        artifact_id: ArtifactId,
        from_stage: Stage,
        target_stage: Stage,
        reason: String,
        required_roles: Vec<SignerRole>,
    },
    GateRolledBack {
        artifact_id: ArtifactId,
        from_stage: Stage,
        to_stage: Stage,
        request: EntryId,
    },
    ParameterChangeProposed {
        artifact_id: ArtifactId,
        name: String,
        old_value: Option<Decimal>,
        new_value: Decimal,
        pathway: ChangePathway,
        rationale: String,
        required_roles: Vec<SignerRole>,
    },
    ParameterChanged {
        artifact_id: ArtifactId,
        name: String,
        old_value: Option<Decimal>,
        new_value: Decimal,
        pathway: ChangePathway,
        approval: Option<EntryId>,
    },

    // ------------------------------------------------------------------
    // Attestation
    // ------------------------------------------------------------------
    AttestationRecorded {
        target: EntryId,
        signer: SignerIdentity,
        role: SignerRole,
        payload_hash: Digest,
        /// 65-byte recoverable signature, hex encoded.
        signature: String,
    },

    // ------------------------------------------------------------------
    // Oracle & signals
    // ------------------------------------------------------------------
    ContextRefreshed {
        version: u64,
        snapshot: ContextSnapshot,
    },
    SignalRegistered {
        candidate_id: CandidateId,
        confidence: Decimal,
    },
    SignalTransition {
        candidate_id: CandidateId,
        from: SignalStateKind,
        to: SignalStateKind,
        accepted: bool,
        reason: Option<String>,
    },

    // ------------------------------------------------------------------
    // Promotion pipeline
    // ------------------------------------------------------------------
    ShadowDecision {
        decision_id: Uuid,
        candidate_id: CandidateId,
        artifact_id: ArtifactId,
        would_promote: bool,
        reason: String,
    },
    PromotionCommitted {
        candidate_id: CandidateId,
        artifact_id: ArtifactId,
        ramp_percent: u8,
    },
    PromotionReverted {
        candidate_id: CandidateId,
        artifact_id: ArtifactId,
        reason: String,
    },
    PipelineEvent {
        event: PipelineEventKind,
        detail: String,
    },
    Escalation {
        kind: EscalationKind,
        detail: String,
    },

    // ------------------------------------------------------------------
    // Ledger housekeeping
    // ------------------------------------------------------------------
    ImmutableViolation {
        target: EntryId,
        attempt: String,
        actor: SignerIdentity,
    },
    ChainRotated {
        previous: ChainId,
        previous_head: Digest,
        previous_sequence: u64,
        reason: String,
    },
    ChainResumed {
        chain_id: ChainId,
        broken_at: u64,
        reason: String,
    },

    /// Collaborator-defined event with an opaque body.
    Custom {
        kind: String,
        body: serde_json::Value,
    },
}

impl EntryPayload {
    /// Short event name for logs and metrics.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::ArtifactRegistered { .. } => "artifact_registered",
            Self::GateSubmission { .. } => "gate_submission",
            Self::GateAdvanced { .. } => "gate_advanced",
            Self::GateRejected { .. } => "gate_rejected",
            Self::RollbackRequested { .. } => "rollback_requested",
            Self::GateRolledBack { .. } => "gate_rolled_back",
            Self::ParameterChangeProposed { .. } => "parameter_change_proposed",
            Self::ParameterChanged { .. } => "parameter_changed",
            Self::AttestationRecorded { .. } => "attestation_recorded",
            Self::ContextRefreshed { .. } => "context_refreshed",
            Self::SignalRegistered { .. } => "signal_registered",
            Self::SignalTransition { .. } => "signal_transition",
            Self::ShadowDecision { .. } => "shadow_decision",
            Self::PromotionCommitted { .. } => "promotion_committed",
            Self::PromotionReverted { .. } => "promotion_reverted",
            Self::PipelineEvent { .. } => "pipeline_event",
            Self::Escalation { .. } => "escalation",
            Self::ImmutableViolation { .. } => "immutable_violation",
            Self::ChainRotated { .. } => "chain_rotated",
            Self::ChainResumed { .. } => "chain_resumed",
            Self::Custom { .. } => "custom",
        }
    }

    /// Artifact this event concerns, if any.
    #[must_use]
    pub fn artifact_id(&self) -> Option<&ArtifactId> {
        match self {
            Self::ArtifactRegistered { artifact_id, .. }
            | Self::GateSubmission { artifact_id, .. }
            | Self::GateAdvanced { artifact_id, .. }
            | Self::GateRejected { artifact_id, .. }
            | Self::RollbackRequested { artifact_id, .. }
            | Self::GateRolledBack { artifact_id, .. }
            | Self::ParameterChangeProposed { artifact_id, .. }
            | Self::ParameterChanged { artifact_id, .. }
            | Self::ShadowDecision { artifact_id, .. }
            | Self::PromotionCommitted { artifact_id, .. }
            | Self::PromotionReverted { artifact_id, .. } => Some(artifact_id),
            _ => None,
        }
    }

    /// Candidate this event concerns, if any.
    #[must_use]
    pub fn candidate_id(&self) -> Option<&CandidateId> {
        match self {
            Self::SignalRegistered { candidate_id, .. }
            | Self::SignalTransition { candidate_id, .. }
            | Self::ShadowDecision { candidate_id, .. }
            | Self::PromotionCommitted { candidate_id, .. }
            | Self::PromotionReverted { candidate_id, .. } => Some(candidate_id),
            _ => None,
        }
    }
}
