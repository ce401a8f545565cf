use bastion_attest::AttestError;
use bastion_core::{ArtifactId, ArtifactKind, EvidenceKind, SignerIdentity, SignerRole, Stage};
use bastion_ledger::{EntryId, LedgerError};
use rust_decimal::Decimal;
use thiserror::Error;

use crate::record::ModificationAuthority;

#[derive(Debug, Error)]
pub enum GateError {
    #[error("Unknown artifact: {0}")]
    UnknownArtifact(ArtifactId),

    #[error("Artifact already registered: {0}")]
    AlreadyRegistered(ArtifactId),

    #[error("Artifact kind {0} is not enabled")]
    UnknownTaxonomy(ArtifactKind),

    #[error("Stage skip on {artifact_id}: at {current}, requested {target}")]
    StageSkip {
        artifact_id: ArtifactId,
        current: Stage,
        target: Stage,
    },

    #[error("Missing evidence for {stage} on {artifact_id}: {missing:?}")]
    MissingEvidence {
        artifact_id: ArtifactId,
        stage: Stage,
        missing: Vec<EvidenceKind>,
    },

    #[error("Artifact {artifact_id} is locked at {stage}")]
    Locked { artifact_id: ArtifactId, stage: Stage },

    #[error("Artifact {artifact_id} requires {required:?} authority for changes")]
    AuthorityRequired {
        artifact_id: ArtifactId,
        required: ModificationAuthority,
    },

    #[error("{actor} is not the owner of {artifact_id}")]
    NotOwner {
        artifact_id: ArtifactId,
        actor: SignerIdentity,
    },

    #[error("Operation on {artifact_id} already pending as {entry_id}")]
    AlreadyPending {
        artifact_id: ArtifactId,
        entry_id: EntryId,
    },

    #[error("No pending {operation} for {artifact_id}")]
    NothingPending {
        artifact_id: ArtifactId,
        operation: &'static str,
    },

    #[error("{entry_id} lacks attestation from {missing:?}")]
    NotFullyAttested {
        entry_id: EntryId,
        missing: Vec<SignerRole>,
    },

    #[error("Rollback target {target} must precede current stage {current}")]
    InvalidRollbackTarget { current: Stage, target: Stage },

    #[error("Unknown parameter {name} on {artifact_id}")]
    UnknownParameter { artifact_id: ArtifactId, name: String },

    #[error("Recalibration of {name} from {old} to {new} exceeds bound {max_delta}")]
    RecalibrationOutOfBounds {
        name: String,
        old: Decimal,
        new: Decimal,
        max_delta: Decimal,
    },

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Attestation error: {0}")]
    Attest(#[from] AttestError),
}

pub type GateResult<T> = Result<T, GateError>;
