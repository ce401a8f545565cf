//! Gate Lifecycle Engine.

use std::sync::Arc;

use bastion_attest::AttestationService;
use bastion_core::{
    ArtifactDescriptor, ArtifactId, Clock, EvidenceKind, EvidenceRef, SignerIdentity, Stage,
};
use bastion_ledger::{ChangePathway, EntryId, EntryPayload, Ledger, LedgerEntry};
use bastion_telemetry::Metrics;
use dashmap::DashMap;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use tracing::{error, info, warn};

use crate::config::GateConfig;
use crate::error::{GateError, GateResult};
use crate::record::{
    GateRecord, ModificationAuthority, PendingChange, PendingRollback, PendingSubmission,
};

/// Scope of the chain recording gate events.
pub const GATE_SCOPE: &str = "gate";

/// Serializes operations per artifact; different artifacts proceed in
/// parallel. Every state change is appended to the ledger first and applied
/// only if the append succeeds.
pub struct GateEngine {
    ledger: Arc<Ledger>,
    attestation: Arc<AttestationService>,
    clock: Arc<dyn Clock>,
    config: GateConfig,
    records: DashMap<ArtifactId, Arc<Mutex<GateRecord>>>,
}

impl GateEngine {
    pub fn new(
        ledger: Arc<Ledger>,
        attestation: Arc<AttestationService>,
        clock: Arc<dyn Clock>,
        config: GateConfig,
    ) -> Self {
        Self {
            ledger,
            attestation,
            clock,
            config,
            records: DashMap::new(),
        }
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    fn handle(&self, artifact_id: &ArtifactId) -> GateResult<Arc<Mutex<GateRecord>>> {
        self.records
            .get(artifact_id)
            .map(|r| Arc::clone(&r))
            .ok_or_else(|| GateError::UnknownArtifact(artifact_id.clone()))
    }

    fn append(&self, payload: EntryPayload, actor: &SignerIdentity) -> GateResult<LedgerEntry> {
        Ok(self.ledger.append(GATE_SCOPE, payload, actor.clone())?)
    }

    /// Record a refused operation and hand back the error.
    fn reject(
        &self,
        record: &mut GateRecord,
        operation: &'static str,
        err: GateError,
        actor: &SignerIdentity,
    ) -> GateError {
        let stage = record.current_stage;
        Metrics::gate_transition(operation, stage.as_str(), "rejected");
        warn!(
            artifact_id = %record.artifact_id(),
            stage = %stage,
            operation,
            error = %err,
            "Gate operation rejected"
        );
        let payload = EntryPayload::GateRejected {
            artifact_id: record.artifact_id().clone(),
            stage,
            operation: operation.to_string(),
            reason: err.to_string(),
        };
        match self.append(payload, actor) {
            Ok(entry) => record.history.push(entry.id()),
            Err(e) => error!(artifact_id = %record.artifact_id(), error = %e, "Failed to record rejection"),
        }
        err
    }

    fn require_attested(
        &self,
        record: &mut GateRecord,
        operation: &'static str,
        entry_id: &EntryId,
        actor: &SignerIdentity,
    ) -> GateResult<()> {
        let missing = self.attestation.missing_roles(entry_id)?;
        if missing.is_empty() {
            return Ok(());
        }
        let err = GateError::NotFullyAttested {
            entry_id: entry_id.clone(),
            missing,
        };
        Err(self.reject(record, operation, err, actor))
    }

    // ------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------

    /// Create a DRAFT record for a new artifact.
    pub fn register(&self, descriptor: ArtifactDescriptor) -> GateResult<GateRecord> {
        if !self.config.is_kind_enabled(&descriptor.kind) {
            warn!(
                artifact_id = %descriptor.artifact_id,
                kind = %descriptor.kind,
                "Registration refused: kind not enabled"
            );
            return Err(GateError::UnknownTaxonomy(descriptor.kind));
        }

        match self.records.entry(descriptor.artifact_id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(GateError::AlreadyRegistered(descriptor.artifact_id))
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                let entry = self.append(
                    EntryPayload::ArtifactRegistered {
                        artifact_id: descriptor.artifact_id.clone(),
                        kind: descriptor.kind,
                        owner: descriptor.owner.clone(),
                    },
                    &descriptor.owner,
                )?;
                let record = GateRecord::new(descriptor, entry.id(), self.clock.now());
                info!(
                    artifact_id = %record.artifact_id(),
                    kind = %record.descriptor.kind,
                    owner = %record.descriptor.owner,
                    "Artifact registered"
                );
                slot.insert(Arc::new(Mutex::new(record.clone())));
                Ok(record)
            }
        }
    }

    // ------------------------------------------------------------------
    // Forward progress
    // ------------------------------------------------------------------

    /// Submit evidence for the next stage and request its attestation.
    ///
    /// A locked artifact accepts only the LOCK → LIVE deployment submission;
    /// re-running an earlier stage goes through rollback.
    pub fn submit_for_stage(
        &self,
        artifact_id: &ArtifactId,
        target: Stage,
        evidence: Vec<EvidenceRef>,
        submitter: &SignerIdentity,
    ) -> GateResult<GateRecord> {
        let handle = self.handle(artifact_id)?;
        let mut record = handle.lock();

        if let Some(pending) = &record.pending_submission {
            return Err(GateError::AlreadyPending {
                artifact_id: artifact_id.clone(),
                entry_id: pending.entry_id.clone(),
            });
        }

        let current = record.current_stage;
        let is_deployment = current == Stage::ConstitutionalLock && target == Stage::Live;
        if record.locked && !is_deployment {
            let err = GateError::Locked {
                artifact_id: artifact_id.clone(),
                stage: current,
            };
            return Err(self.reject(&mut record, "submit", err, submitter));
        }
        if current.next() != Some(target) {
            let err = GateError::StageSkip {
                artifact_id: artifact_id.clone(),
                current,
                target,
            };
            return Err(self.reject(&mut record, "submit", err, submitter));
        }

        let requirement = self.config.requirement(target);
        let missing: Vec<EvidenceKind> = requirement
            .evidence
            .iter()
            .filter(|kind| !evidence.iter().any(|e| e.kind == **kind))
            .copied()
            .collect();
        if !missing.is_empty() {
            let err = GateError::MissingEvidence {
                artifact_id: artifact_id.clone(),
                stage: target,
                missing,
            };
            return Err(self.reject(&mut record, "submit", err, submitter));
        }

        let entry = self.append(
            EntryPayload::GateSubmission {
                artifact_id: artifact_id.clone(),
                kind: record.descriptor.kind,
                from_stage: current,
                target_stage: target,
                evidence: evidence.clone(),
                required_roles: requirement.roles.clone(),
            },
            submitter,
        )?;
        self.attestation
            .request_attestation(&entry.id(), &requirement.roles)?;

        record.pending_submission = Some(PendingSubmission {
            entry_id: entry.id(),
            target_stage: target,
            evidence,
        });
        record.history.push(entry.id());
        record.updated_at = self.clock.now();

        Metrics::gate_transition("submit", target.as_str(), "ok");
        info!(
            artifact_id = %artifact_id,
            from = %current,
            stage = %target,
            entry = %entry.id(),
            roles = ?requirement.roles,
            "Stage submission recorded"
        );
        Ok(record.clone())
    }

    /// Commit the pending submission once fully attested. Moves exactly one stage.
    pub fn advance(&self, artifact_id: &ArtifactId, actor: &SignerIdentity) -> GateResult<GateRecord> {
        let handle = self.handle(artifact_id)?;
        let mut record = handle.lock();

        let pending = record
            .pending_submission
            .clone()
            .ok_or_else(|| GateError::NothingPending {
                artifact_id: artifact_id.clone(),
                operation: "submission",
            })?;
        self.require_attested(&mut record, "advance", &pending.entry_id, actor)?;

        let from = record.current_stage;
        let entry = self.append(
            EntryPayload::GateAdvanced {
                artifact_id: artifact_id.clone(),
                from_stage: from,
                to_stage: pending.target_stage,
                submission: pending.entry_id.clone(),
            },
            actor,
        )?;

        let now = self.clock.now();
        self.attestation.release(&pending.entry_id);
        record.evidence_refs.extend(pending.evidence);
        record.pending_submission = None;
        record.enter_stage(pending.target_stage, now);
        record.history.push(entry.id());

        Metrics::gate_transition("advance", pending.target_stage.as_str(), "ok");
        info!(
            artifact_id = %artifact_id,
            from = %from,
            stage = %record.current_stage,
            locked = record.locked,
            authority = ?record.modification_authority,
            "Artifact advanced"
        );
        Ok(record.clone())
    }

    // ------------------------------------------------------------------
    // Rollback
    // ------------------------------------------------------------------

    pub fn request_rollback(
        &self,
        artifact_id: &ArtifactId,
        target: Stage,
        reason: &str,
        requester: &SignerIdentity,
    ) -> GateResult<GateRecord> {
        let handle = self.handle(artifact_id)?;
        let mut record = handle.lock();

        if let Some(pending) = &record.pending_rollback {
            return Err(GateError::AlreadyPending {
                artifact_id: artifact_id.clone(),
                entry_id: pending.entry_id.clone(),
            });
        }
        let current = record.current_stage;
        if target >= current {
            let err = GateError::InvalidRollbackTarget { current, target };
            return Err(self.reject(&mut record, "rollback", err, requester));
        }

        let roles = self.config.rollback_roles.clone();
        let entry = self.append(
            EntryPayload::RollbackRequested {
                artifact_id: artifact_id.clone(),
                from_stage: current,
                target_stage: target,
                reason: reason.to_string(),
                required_roles: roles.clone(),
            },
            requester,
        )?;
        self.attestation.request_attestation(&entry.id(), &roles)?;

        record.pending_rollback = Some(PendingRollback {
            entry_id: entry.id(),
            target_stage: target,
            reason: reason.to_string(),
        });
        record.history.push(entry.id());
        record.updated_at = self.clock.now();

        Metrics::gate_transition("rollback_request", target.as_str(), "ok");
        warn!(
            artifact_id = %artifact_id,
            from = %current,
            target = %target,
            reason,
            "Rollback requested"
        );
        Ok(record.clone())
    }

    pub fn commit_rollback(
        &self,
        artifact_id: &ArtifactId,
        actor: &SignerIdentity,
    ) -> GateResult<GateRecord> {
        let handle = self.handle(artifact_id)?;
        let mut record = handle.lock();

        let pending = record
            .pending_rollback
            .clone()
            .ok_or_else(|| GateError::NothingPending {
                artifact_id: artifact_id.clone(),
                operation: "rollback",
            })?;
        self.require_attested(&mut record, "rollback", &pending.entry_id, actor)?;

        let from = record.current_stage;
        let entry = self.append(
            EntryPayload::GateRolledBack {
                artifact_id: artifact_id.clone(),
                from_stage: from,
                to_stage: pending.target_stage,
                request: pending.entry_id.clone(),
            },
            actor,
        )?;

        self.attestation.release(&pending.entry_id);
        if let Some(superseded) = &record.pending_submission {
            self.attestation.release(&superseded.entry_id);
        }
        record.pending_rollback = None;
        record.return_to_stage(pending.target_stage, self.clock.now());
        record.history.push(entry.id());

        Metrics::gate_transition("rollback", pending.target_stage.as_str(), "ok");
        warn!(
            artifact_id = %artifact_id,
            from = %from,
            stage = %record.current_stage,
            locked = record.locked,
            "Artifact rolled back"
        );
        Ok(record.clone())
    }

    // ------------------------------------------------------------------
    // Parameters
    // ------------------------------------------------------------------

    /// Direct change by the owner while the artifact still has Owner authority.
    pub fn set_parameter(
        &self,
        artifact_id: &ArtifactId,
        name: &str,
        value: Decimal,
        actor: &SignerIdentity,
    ) -> GateResult<GateRecord> {
        let handle = self.handle(artifact_id)?;
        let mut record = handle.lock();

        if record.locked {
            let err = GateError::Locked {
                artifact_id: artifact_id.clone(),
                stage: record.current_stage,
            };
            return Err(self.reject(&mut record, "set_parameter", err, actor));
        }
        if record.modification_authority != ModificationAuthority::Owner {
            let err = GateError::AuthorityRequired {
                artifact_id: artifact_id.clone(),
                required: record.modification_authority,
            };
            return Err(self.reject(&mut record, "set_parameter", err, actor));
        }
        if *actor != record.descriptor.owner {
            let err = GateError::NotOwner {
                artifact_id: artifact_id.clone(),
                actor: actor.clone(),
            };
            return Err(self.reject(&mut record, "set_parameter", err, actor));
        }

        let old_value = record.parameters.get(name).copied();
        let entry = self.append(
            EntryPayload::ParameterChanged {
                artifact_id: artifact_id.clone(),
                name: name.to_string(),
                old_value,
                new_value: value,
                pathway: ChangePathway::Direct,
                approval: None,
            },
            actor,
        )?;
        record.parameters.insert(name.to_string(), value);
        record.history.push(entry.id());
        record.updated_at = self.clock.now();

        info!(artifact_id = %artifact_id, name, %value, "Parameter set");
        Ok(record.clone())
    }

    /// Propose an attested change: dual signoff while unlocked, bounded
    /// recalibration once locked.
    pub fn propose_change(
        &self,
        artifact_id: &ArtifactId,
        name: &str,
        new_value: Decimal,
        rationale: &str,
        proposer: &SignerIdentity,
    ) -> GateResult<GateRecord> {
        let handle = self.handle(artifact_id)?;
        let mut record = handle.lock();

        if let Some(pending) = &record.pending_change {
            return Err(GateError::AlreadyPending {
                artifact_id: artifact_id.clone(),
                entry_id: pending.entry_id.clone(),
            });
        }

        let old_value = record.parameters.get(name).copied();
        let (pathway, roles) = if record.locked {
            let Some(old) = old_value else {
                let err = GateError::UnknownParameter {
                    artifact_id: artifact_id.clone(),
                    name: name.to_string(),
                };
                return Err(self.reject(&mut record, "recalibrate", err, proposer));
            };
            if !within_bound(old, new_value, self.config.max_recalibration_delta) {
                let err = GateError::RecalibrationOutOfBounds {
                    name: name.to_string(),
                    old,
                    new: new_value,
                    max_delta: self.config.max_recalibration_delta,
                };
                return Err(self.reject(&mut record, "recalibrate", err, proposer));
            }
            (
                ChangePathway::Recalibration,
                self.config.recalibration_roles.clone(),
            )
        } else {
            (
                ChangePathway::DualSignoff,
                self.config.dual_signoff_roles.clone(),
            )
        };

        let entry = self.append(
            EntryPayload::ParameterChangeProposed {
                artifact_id: artifact_id.clone(),
                name: name.to_string(),
                old_value,
                new_value,
                pathway,
                rationale: rationale.to_string(),
                required_roles: roles.clone(),
            },
            proposer,
        )?;
        self.attestation.request_attestation(&entry.id(), &roles)?;

        record.pending_change = Some(PendingChange {
            entry_id: entry.id(),
            name: name.to_string(),
            old_value,
            new_value,
            pathway,
        });
        record.history.push(entry.id());
        record.updated_at = self.clock.now();

        info!(
            artifact_id = %artifact_id,
            name,
            %new_value,
            pathway = pathway.as_str(),
            "Parameter change proposed"
        );
        Ok(record.clone())
    }

    pub fn commit_change(
        &self,
        artifact_id: &ArtifactId,
        actor: &SignerIdentity,
    ) -> GateResult<GateRecord> {
        let handle = self.handle(artifact_id)?;
        let mut record = handle.lock();

        let pending = record
            .pending_change
            .clone()
            .ok_or_else(|| GateError::NothingPending {
                artifact_id: artifact_id.clone(),
                operation: "change",
            })?;
        self.require_attested(&mut record, "commit_change", &pending.entry_id, actor)?;

        if pending.pathway == ChangePathway::DualSignoff && record.locked {
            self.attestation.release(&pending.entry_id);
            record.pending_change = None;
            let err = GateError::Locked {
                artifact_id: artifact_id.clone(),
                stage: record.current_stage,
            };
            return Err(self.reject(&mut record, "commit_change", err, actor));
        }

        let entry = self.append(
            EntryPayload::ParameterChanged {
                artifact_id: artifact_id.clone(),
                name: pending.name.clone(),
                old_value: pending.old_value,
                new_value: pending.new_value,
                pathway: pending.pathway,
                approval: Some(pending.entry_id.clone()),
            },
            actor,
        )?;
        self.attestation.release(&pending.entry_id);
        record.parameters.insert(pending.name.clone(), pending.new_value);
        record.pending_change = None;
        record.history.push(entry.id());
        record.updated_at = self.clock.now();

        info!(
            artifact_id = %artifact_id,
            name = %pending.name,
            value = %pending.new_value,
            pathway = pending.pathway.as_str(),
            "Parameter change committed"
        );
        Ok(record.clone())
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn record(&self, artifact_id: &ArtifactId) -> GateResult<GateRecord> {
        Ok(self.handle(artifact_id)?.lock().clone())
    }

    pub fn records(&self) -> Vec<GateRecord> {
        self.records.iter().map(|r| r.lock().clone()).collect()
    }

    /// Every gate entry concerning the artifact, oldest first.
    pub fn history(&self, artifact_id: &ArtifactId) -> GateResult<Vec<LedgerEntry>> {
        let ids = self.handle(artifact_id)?.lock().history.clone();
        let mut entries = Vec::with_capacity(ids.len());
        for id in &ids {
            match self.ledger.get(id)? {
                Some(entry) => entries.push(entry),
                None => warn!(artifact_id = %artifact_id, entry = %id, "History entry missing from ledger"),
            }
        }
        Ok(entries)
    }
}

/// `|new - old| / |old| <= max_delta`; a zero baseline admits no change.
fn within_bound(old: Decimal, new: Decimal, max_delta: Decimal) -> bool {
    if old.is_zero() {
        return new.is_zero();
    }
    (new - old).abs() / old.abs() <= max_delta
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::signers::local::PrivateKeySigner;
    use bastion_attest::{AttestationConfig, SignerRegistry};
    use bastion_core::{ArtifactKind, FeatureClass, LogEscalationSink, ManualClock, SignerRole};
    use bastion_ledger::{LedgerConfig, MemoryStore};
    use rust_decimal_macros::dec;

    const ROLES: [(&str, SignerRole); 5] = [
        ("alice", SignerRole::Owner),
        ("bob", SignerRole::Governance),
        ("carol", SignerRole::Technical),
        ("dave", SignerRole::Risk),
        ("erin", SignerRole::Operations),
    ];

    struct Fixture {
        engine: GateEngine,
        attestation: Arc<AttestationService>,
        keys: Vec<(SignerIdentity, SignerRole, PrivateKeySigner)>,
    }

    fn fixture_with(config: GateConfig) -> Fixture {
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::default());
        let ledger = Arc::new(
            Ledger::open(
                Arc::new(MemoryStore::new()),
                Arc::clone(&clock),
                Arc::new(LogEscalationSink),
                LedgerConfig::default(),
            )
            .unwrap(),
        );
        let mut registry = SignerRegistry::new();
        let mut keys = Vec::new();
        for (i, (name, role)) in ROLES.into_iter().enumerate() {
            let key = PrivateKeySigner::from_slice(&[i as u8 + 1; 32]).unwrap();
            registry
                .register(SignerIdentity::from(name), role, key.address())
                .unwrap();
            keys.push((SignerIdentity::from(name), role, key));
        }
        let attestation = Arc::new(AttestationService::new(
            Arc::clone(&ledger),
            registry,
            Arc::clone(&clock),
            &AttestationConfig::default(),
        ));
        let engine = GateEngine::new(ledger, Arc::clone(&attestation), clock, config);
        Fixture {
            engine,
            attestation,
            keys,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(GateConfig::default())
    }

    fn alice() -> SignerIdentity {
        SignerIdentity::from("alice")
    }

    fn artifact() -> ArtifactId {
        ArtifactId::from("feat-momentum-1")
    }

    fn evidence_for(stage: Stage) -> Vec<EvidenceRef> {
        GateConfig::default()
            .requirement(stage)
            .evidence
            .into_iter()
            .map(|kind| EvidenceRef::new(kind, format!("report://{stage}/{kind}")))
            .collect()
    }

    impl Fixture {
        fn register(&self) {
            self.engine
                .register(ArtifactDescriptor {
                    artifact_id: artifact(),
                    kind: ArtifactKind::Feature(FeatureClass::Volatility),
                    owner: alice(),
                })
                .unwrap();
        }

        async fn attest(&self, entry_id: &EntryId, roles: &[SignerRole]) {
            for role in roles {
                let (identity, _, key) = self.keys.iter().find(|(_, r, _)| r == role).unwrap();
                self.attestation.sign(entry_id, identity, key).await.unwrap();
            }
        }

        async fn step(&self, target: Stage) -> GateRecord {
            let record = self
                .engine
                .submit_for_stage(&artifact(), target, evidence_for(target), &alice())
                .unwrap();
            let pending = record.pending_submission.unwrap();
            let roles = self.engine.config().requirement(target).roles;
            self.attest(&pending.entry_id, &roles).await;
            let record = self.engine.advance(&artifact(), &alice()).unwrap();
            assert!(self.attestation.pending(&pending.entry_id).is_none());
            record
        }
    }

    #[test]
    fn test_stage_skip_keeps_draft() {
        let fx = fixture();
        fx.register();

        let err = fx
            .engine
            .submit_for_stage(
                &artifact(),
                Stage::OperationalTest,
                evidence_for(Stage::OperationalTest),
                &alice(),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            GateError::StageSkip {
                current: Stage::Draft,
                target: Stage::OperationalTest,
                ..
            }
        ));

        let record = fx.engine.record(&artifact()).unwrap();
        assert_eq!(record.current_stage, Stage::Draft);
        assert!(record.pending_submission.is_none());

        let history = fx.engine.history(&artifact()).unwrap();
        assert!(matches!(
            history.last().unwrap().payload(),
            EntryPayload::GateRejected { .. }
        ));
    }

    #[test]
    fn test_missing_evidence_rejected() {
        let fx = fixture();
        fx.register();
        let err = fx
            .engine
            .submit_for_stage(&artifact(), Stage::TechnicalValidation, vec![], &alice())
            .unwrap_err();
        match err {
            GateError::MissingEvidence { missing, .. } => {
                assert_eq!(missing, vec![EvidenceKind::TestReport]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_advance_requires_full_attestation() {
        let fx = fixture();
        fx.register();
        let record = fx
            .engine
            .submit_for_stage(
                &artifact(),
                Stage::TechnicalValidation,
                evidence_for(Stage::TechnicalValidation),
                &alice(),
            )
            .unwrap();
        let entry_id = record.pending_submission.unwrap().entry_id;

        fx.attest(&entry_id, &[SignerRole::Owner]).await;
        let err = fx.engine.advance(&artifact(), &alice()).unwrap_err();
        match err {
            GateError::NotFullyAttested { missing, .. } => {
                assert_eq!(missing, vec![SignerRole::Technical]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(
            fx.engine.record(&artifact()).unwrap().current_stage,
            Stage::Draft
        );

        fx.attest(&entry_id, &[SignerRole::Technical]).await;
        let record = fx.engine.advance(&artifact(), &alice()).unwrap();
        assert_eq!(record.current_stage, Stage::TechnicalValidation);
        assert_eq!(record.evidence_refs.len(), 1);

        let err = fx.engine.advance(&artifact(), &alice()).unwrap_err();
        assert!(matches!(err, GateError::NothingPending { .. }));
    }

    #[tokio::test]
    async fn test_full_cycle_locks_and_goes_live() {
        let fx = fixture();
        fx.register();
        for stage in [
            Stage::TechnicalValidation,
            Stage::GovernanceValidation,
            Stage::OperationalTest,
        ] {
            let record = fx.step(stage).await;
            assert_eq!(record.current_stage, stage);
            assert!(!record.locked);
        }

        let locked = fx.step(Stage::ConstitutionalLock).await;
        assert!(locked.locked);
        assert_eq!(
            locked.modification_authority,
            ModificationAuthority::FullCycleRequired
        );

        let err = fx
            .engine
            .submit_for_stage(
                &artifact(),
                Stage::TechnicalValidation,
                evidence_for(Stage::TechnicalValidation),
                &alice(),
            )
            .unwrap_err();
        assert!(matches!(err, GateError::Locked { .. }));

        let live = fx.step(Stage::Live).await;
        assert_eq!(live.current_stage, Stage::Live);
        assert!(live.locked);

        let advances = fx
            .engine
            .history(&artifact())
            .unwrap()
            .into_iter()
            .filter(|e| matches!(e.payload(), EntryPayload::GateAdvanced { .. }))
            .count();
        assert_eq!(advances, 5);
    }

    #[tokio::test]
    async fn test_rollback_needs_owner_and_governance_and_unlocks() {
        let fx = fixture();
        fx.register();
        for stage in [
            Stage::TechnicalValidation,
            Stage::GovernanceValidation,
            Stage::OperationalTest,
            Stage::ConstitutionalLock,
        ] {
            fx.step(stage).await;
        }

        let record = fx
            .engine
            .request_rollback(&artifact(), Stage::OperationalTest, "regime shift", &alice())
            .unwrap();
        let request = record.pending_rollback.unwrap().entry_id;

        fx.attest(&request, &[SignerRole::Owner]).await;
        assert!(matches!(
            fx.engine.commit_rollback(&artifact(), &alice()),
            Err(GateError::NotFullyAttested { .. })
        ));

        fx.attest(&request, &[SignerRole::Governance]).await;
        let record = fx.engine.commit_rollback(&artifact(), &alice()).unwrap();
        assert!(fx.attestation.pending(&request).is_none());
        assert_eq!(record.current_stage, Stage::OperationalTest);
        assert!(!record.locked);
        assert_eq!(record.highest_stage, Stage::ConstitutionalLock);
        assert_eq!(
            record.modification_authority,
            ModificationAuthority::FullCycleRequired
        );

        let err = fx
            .engine
            .request_rollback(&artifact(), Stage::Live, "forward?", &alice())
            .unwrap_err();
        assert!(matches!(err, GateError::InvalidRollbackTarget { .. }));
    }

    #[tokio::test]
    async fn test_parameter_pathways() {
        let fx = fixture();
        fx.register();

        fx.engine
            .set_parameter(&artifact(), "weight", dec!(0.50), &alice())
            .unwrap();
        let err = fx
            .engine
            .set_parameter(&artifact(), "weight", dec!(0.60), &SignerIdentity::from("bob"))
            .unwrap_err();
        assert!(matches!(err, GateError::NotOwner { .. }));

        fx.step(Stage::TechnicalValidation).await;
        fx.step(Stage::GovernanceValidation).await;
        let err = fx
            .engine
            .set_parameter(&artifact(), "weight", dec!(0.60), &alice())
            .unwrap_err();
        assert!(matches!(
            err,
            GateError::AuthorityRequired {
                required: ModificationAuthority::DualSignoff,
                ..
            }
        ));

        let record = fx
            .engine
            .propose_change(&artifact(), "weight", dec!(0.60), "rebalance", &alice())
            .unwrap();
        let change = record.pending_change.unwrap();
        assert_eq!(change.pathway, ChangePathway::DualSignoff);
        fx.attest(&change.entry_id, &[SignerRole::Owner, SignerRole::Governance])
            .await;
        let record = fx.engine.commit_change(&artifact(), &alice()).unwrap();
        assert_eq!(record.parameters["weight"], dec!(0.60));
    }

    #[tokio::test]
    async fn test_locked_artifact_only_recalibrates_within_bound() {
        let fx = fixture();
        fx.register();
        fx.engine
            .set_parameter(&artifact(), "weight", dec!(0.50), &alice())
            .unwrap();
        for stage in [
            Stage::TechnicalValidation,
            Stage::GovernanceValidation,
            Stage::OperationalTest,
            Stage::ConstitutionalLock,
        ] {
            fx.step(stage).await;
        }

        let err = fx
            .engine
            .set_parameter(&artifact(), "weight", dec!(0.52), &alice())
            .unwrap_err();
        assert!(matches!(err, GateError::Locked { .. }));

        let err = fx
            .engine
            .propose_change(&artifact(), "weight", dec!(0.60), "too far", &alice())
            .unwrap_err();
        assert!(matches!(err, GateError::RecalibrationOutOfBounds { .. }));

        let err = fx
            .engine
            .propose_change(&artifact(), "new_knob", dec!(1), "new", &alice())
            .unwrap_err();
        assert!(matches!(err, GateError::UnknownParameter { .. }));

        let record = fx
            .engine
            .propose_change(&artifact(), "weight", dec!(0.54), "drift fix", &alice())
            .unwrap();
        let change = record.pending_change.unwrap();
        assert_eq!(change.pathway, ChangePathway::Recalibration);
        fx.attest(&change.entry_id, &[SignerRole::Governance, SignerRole::Risk])
            .await;
        let record = fx.engine.commit_change(&artifact(), &alice()).unwrap();
        assert_eq!(record.parameters["weight"], dec!(0.54));
        assert!(record.locked);
    }

    #[test]
    fn test_registration_checks() {
        let fx = fixture_with(GateConfig {
            enabled_kinds: vec![ArtifactKind::Feature(FeatureClass::Volatility)],
            ..GateConfig::default()
        });
        fx.register();

        let err = fx
            .engine
            .register(ArtifactDescriptor {
                artifact_id: artifact(),
                kind: ArtifactKind::Feature(FeatureClass::Volatility),
                owner: alice(),
            })
            .unwrap_err();
        assert!(matches!(err, GateError::AlreadyRegistered(_)));

        let err = fx
            .engine
            .register(ArtifactDescriptor {
                artifact_id: ArtifactId::from("feat-2"),
                kind: ArtifactKind::Feature(FeatureClass::Sentiment),
                owner: alice(),
            })
            .unwrap_err();
        assert!(matches!(err, GateError::UnknownTaxonomy(_)));

        assert!(matches!(
            fx.engine.advance(&ArtifactId::from("nope"), &alice()),
            Err(GateError::UnknownArtifact(_))
        ));
    }

    #[test]
    fn test_within_bound() {
        assert!(within_bound(dec!(0.50), dec!(0.55), dec!(0.10)));
        assert!(!within_bound(dec!(0.50), dec!(0.56), dec!(0.10)));
        assert!(within_bound(dec!(-2), dec!(-1.8), dec!(0.10)));
        assert!(!within_bound(dec!(0), dec!(0.01), dec!(0.10)));
    }
}
