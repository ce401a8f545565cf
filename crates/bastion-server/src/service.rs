//! External-interface facade over the engines.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bastion_attest::{Attestation, AttestationService, KeyManager};
use bastion_core::{
    ArtifactDescriptor, ArtifactId, CandidateId, ContextSnapshot, EvidenceRef, SignerIdentity,
    Stage,
};
use bastion_gate::{GateEngine, GateRecord, GATE_SCOPE};
use bastion_ledger::{ChainId, ChainVerification, EntryId, Ledger, LedgerEntry};
use bastion_oracle::{ContextOracle, OracleResult, VersionedSnapshot};
use bastion_pipeline::{PromotionOutcome, PromotionPipeline, PromotionRequest, PIPELINE_SCOPE};
use bastion_signal::{SignalEngine, SIGNAL_SCOPE};
use tracing::{info, warn};

use crate::error::{AppError, AppResult};

const GATE_SLA_STAGE: &str = "gate_validation";

pub struct GovernanceService {
    pub ledger: Arc<Ledger>,
    pub attestation: Arc<AttestationService>,
    pub gate: Arc<GateEngine>,
    pub oracle: Arc<ContextOracle>,
    pub signal: Arc<SignalEngine>,
    pub pipeline: Arc<PromotionPipeline>,
    keys: KeyManager,
    sign_timeout: Duration,
    ingest_timeout: Duration,
}

impl GovernanceService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ledger: Arc<Ledger>,
        attestation: Arc<AttestationService>,
        gate: Arc<GateEngine>,
        oracle: Arc<ContextOracle>,
        signal: Arc<SignalEngine>,
        pipeline: Arc<PromotionPipeline>,
        keys: KeyManager,
        sign_timeout: Duration,
    ) -> Self {
        let ingest_timeout = Duration::from_millis(oracle.config().ingest_timeout_ms);
        Self {
            ledger,
            attestation,
            gate,
            oracle,
            signal,
            pipeline,
            keys,
            sign_timeout,
            ingest_timeout,
        }
    }

    // ------------------------------------------------------------------
    // Query
    // ------------------------------------------------------------------

    pub fn verify_chain(&self, chain: &ChainId) -> AppResult<ChainVerification> {
        Ok(self.ledger.verify_chain(chain, ..)?)
    }

    /// Verify every known chain. Breaks halt their chain and escalate.
    pub fn verify_all(&self) -> AppResult<Vec<ChainVerification>> {
        let mut results = Vec::new();
        for chain in self.ledger.chains()? {
            let verification = self.verify_chain(&chain)?;
            if !verification.valid {
                warn!(chain = %chain, broken_at = ?verification.broken_at, "Chain verification failed");
            }
            results.push(verification);
        }
        Ok(results)
    }

    pub fn chains(&self) -> AppResult<Vec<ChainId>> {
        Ok(self.ledger.chains()?)
    }

    /// Gate and pipeline entries concerning `artifact_id`, per scope in
    /// chain order.
    pub fn artifact_history(&self, artifact_id: &ArtifactId) -> AppResult<Vec<LedgerEntry>> {
        let mut entries = Vec::new();
        for scope in [GATE_SCOPE, PIPELINE_SCOPE] {
            entries.extend(
                self.ledger
                    .find(scope, |e| e.payload().artifact_id() == Some(artifact_id))?,
            );
        }
        Ok(entries)
    }

    pub fn candidate_history(&self, candidate_id: &CandidateId) -> AppResult<Vec<LedgerEntry>> {
        let mut entries = Vec::new();
        for scope in [SIGNAL_SCOPE, PIPELINE_SCOPE] {
            entries.extend(
                self.ledger
                    .find(scope, |e| e.payload().candidate_id() == Some(candidate_id))?,
            );
        }
        Ok(entries)
    }

    // ------------------------------------------------------------------
    // Ingestion
    // ------------------------------------------------------------------

    /// Activate a snapshot and publish the resulting status.
    pub fn ingest_snapshot(&self, snapshot: ContextSnapshot) -> AppResult<Arc<VersionedSnapshot>> {
        let active = self.oracle.refresh(snapshot)?;
        self.oracle.poll_status();
        Ok(active)
    }

    /// Await a snapshot from an external source under the ingest deadline.
    pub async fn ingest_from<F>(&self, source: F) -> AppResult<Arc<VersionedSnapshot>>
    where
        F: Future<Output = OracleResult<ContextSnapshot>>,
    {
        let active = self.oracle.ingest(source, self.ingest_timeout).await?;
        self.oracle.poll_status();
        Ok(active)
    }

    // ------------------------------------------------------------------
    // Submission
    // ------------------------------------------------------------------

    pub fn register_artifact(&self, descriptor: ArtifactDescriptor) -> AppResult<GateRecord> {
        Ok(self.gate.register(descriptor)?)
    }

    pub fn submit_for_stage(
        &self,
        artifact_id: &ArtifactId,
        target: Stage,
        evidence: Vec<EvidenceRef>,
        submitter: &SignerIdentity,
    ) -> AppResult<GateRecord> {
        Ok(self
            .gate
            .submit_for_stage(artifact_id, target, evidence, submitter)?)
    }

    /// Commit the pending submission. Gate latency feeds the pipeline SLA.
    pub fn advance(&self, artifact_id: &ArtifactId, actor: &SignerIdentity) -> AppResult<GateRecord> {
        let started = Instant::now();
        let result = self.gate.advance(artifact_id, actor);
        if let Err(e) = self
            .pipeline
            .record_stage_latency(GATE_SLA_STAGE, started.elapsed())
        {
            warn!(error = %e, "Failed to record gate latency");
        }
        Ok(result?)
    }

    /// Sign `entry_id` with the locally held key of `identity`.
    pub async fn attest(&self, entry_id: &EntryId, identity: &SignerIdentity) -> AppResult<Attestation> {
        let signer = self
            .keys
            .signer(identity)
            .ok_or_else(|| AppError::MissingKey(identity.clone()))?;
        let attestation = self
            .attestation
            .sign_with_deadline(entry_id, identity, signer, self.sign_timeout)
            .await?;
        info!(entry = %entry_id, signer = %identity, role = %attestation.role, "Attested with local key");
        Ok(attestation)
    }

    pub fn promote(
        &self,
        request: PromotionRequest,
        actor: &SignerIdentity,
    ) -> AppResult<PromotionOutcome> {
        Ok(self.pipeline.promote(request, actor)?)
    }
}
