//! Per-artifact gate state.

use std::collections::BTreeMap;

use bastion_core::{ArtifactDescriptor, ArtifactId, EvidenceRef, Stage};
use bastion_ledger::{ChangePathway, EntryId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

/// Who may change an artifact. Only ever escalates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModificationAuthority {
    Owner,
    DualSignoff,
    FullCycleRequired,
}

impl ModificationAuthority {
    /// Authority implied by having reached `stage`.
    #[must_use]
    pub fn for_stage(stage: Stage) -> Self {
        match stage {
            Stage::Draft | Stage::TechnicalValidation => Self::Owner,
            Stage::GovernanceValidation | Stage::OperationalTest => Self::DualSignoff,
            Stage::ConstitutionalLock | Stage::Live => Self::FullCycleRequired,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingSubmission {
    pub entry_id: EntryId,
    pub target_stage: Stage,
    pub evidence: Vec<EvidenceRef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingRollback {
    pub entry_id: EntryId,
    pub target_stage: Stage,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingChange {
    pub entry_id: EntryId,
    pub name: String,
    pub old_value: Option<Decimal>,
    pub new_value: Decimal,
    pub pathway: ChangePathway,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GateRecord {
    pub descriptor: ArtifactDescriptor,
    pub current_stage: Stage,
    pub evidence_refs: Vec<EvidenceRef>,
    pub locked: bool,
    pub modification_authority: ModificationAuthority,
    pub highest_stage: Stage,
    pub parameters: BTreeMap<String, Decimal>,
    pub pending_submission: Option<PendingSubmission>,
    pub pending_rollback: Option<PendingRollback>,
    pub pending_change: Option<PendingChange>,
    /// Gate-chain entries concerning this artifact, oldest first.
    pub history: Vec<EntryId>,
    pub updated_at: DateTime<Utc>,
}

impl GateRecord {
    pub(crate) fn new(descriptor: ArtifactDescriptor, registered: EntryId, now: DateTime<Utc>) -> Self {
        Self {
            descriptor,
            current_stage: Stage::Draft,
            evidence_refs: Vec::new(),
            locked: false,
            modification_authority: ModificationAuthority::Owner,
            highest_stage: Stage::Draft,
            parameters: BTreeMap::new(),
            pending_submission: None,
            pending_rollback: None,
            pending_change: None,
            history: vec![registered],
            updated_at: now,
        }
    }

    pub fn artifact_id(&self) -> &ArtifactId {
        &self.descriptor.artifact_id
    }

    /// Move to `stage`, escalating authority and the lock flag.
    pub(crate) fn enter_stage(&mut self, stage: Stage, now: DateTime<Utc>) {
        self.current_stage = stage;
        self.locked = stage.is_locked();
        self.highest_stage = self.highest_stage.max(stage);
        self.modification_authority = self
            .modification_authority
            .max(ModificationAuthority::for_stage(stage));
        self.updated_at = now;
    }

    /// Roll back to `stage`. Authority is kept as is.
    pub(crate) fn return_to_stage(&mut self, stage: Stage, now: DateTime<Utc>) {
        self.current_stage = stage;
        self.locked = stage.is_locked();
        self.pending_submission = None;
        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bastion_core::{ArtifactKind, FeatureClass, SignerIdentity};
    use bastion_ledger::ChainId;

    fn record() -> GateRecord {
        let descriptor = ArtifactDescriptor {
            artifact_id: ArtifactId::from("feat-1"),
            kind: ArtifactKind::Feature(FeatureClass::Price),
            owner: SignerIdentity::from("alice"),
        };
        let entry = EntryId::new(ChainId::initial("gate").unwrap(), 1);
        GateRecord::new(descriptor, entry, Utc::now())
    }

    #[test]
    fn test_authority_never_decreases() {
        let mut record = record();
        record.enter_stage(Stage::GovernanceValidation, Utc::now());
        assert_eq!(record.modification_authority, ModificationAuthority::DualSignoff);
        record.enter_stage(Stage::ConstitutionalLock, Utc::now());
        assert!(record.locked);
        assert_eq!(
            record.modification_authority,
            ModificationAuthority::FullCycleRequired
        );

        record.return_to_stage(Stage::TechnicalValidation, Utc::now());
        assert!(!record.locked);
        assert_eq!(record.current_stage, Stage::TechnicalValidation);
        assert_eq!(record.highest_stage, Stage::ConstitutionalLock);
        assert_eq!(
            record.modification_authority,
            ModificationAuthority::FullCycleRequired
        );
    }
}
