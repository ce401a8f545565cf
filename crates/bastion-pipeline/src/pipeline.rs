use std::fmt;
use std::sync::Arc;
use std::time::{Duration as StdDuration, Instant};

use bastion_core::{
    ArtifactId, CandidateId, Clock, EscalationEvent, EscalationKind, EscalationSink, Severity,
    SignalStateKind, SignerIdentity, Stage,
};
use bastion_gate::{GateEngine, GateRecord};
use bastion_ledger::{EntryPayload, Ledger, LedgerEntry, PipelineEventKind};
use bastion_signal::{SignalEngine, SignalError, SignalState};
use bastion_telemetry::Metrics;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::monitor::{DriftMonitor, DriftReport, SlaReport, SlaTracker};
use crate::ramp::{in_ramp_slice, RampStage};
use crate::rate_limit::{HourlyRateLimiter, PromotionTicket};

/// Scope of the chain recording pipeline events.
pub const PIPELINE_SCOPE: &str = "pipeline";

const SYSTEM_ACTOR: &str = "system:pipeline";
const PROMOTION_STAGE: &str = "promotion";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PauseReason {
    Drift,
    Sla,
    Manual,
}

impl PauseReason {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Drift => "drift",
            Self::Sla => "sla",
            Self::Manual => "manual",
        }
    }
}

impl fmt::Display for PauseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromotionRequest {
    pub candidate_id: CandidateId,
    pub artifact_id: ArtifactId,
    pub confidence: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum PromotionOutcome {
    /// Decision logged for review; nothing changed.
    Shadow {
        decision_id: Uuid,
        would_promote: bool,
        reason: String,
    },
    /// Candidate primed under the current ramp.
    Promoted {
        candidate_id: CandidateId,
        ramp_percent: u8,
        committed_at: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromotionRecord {
    pub candidate_id: CandidateId,
    pub artifact_id: ArtifactId,
    pub committed_at: DateTime<Utc>,
    pub ramp_percent: u8,
    pub reverted: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineStatus {
    pub ramp: RampStage,
    pub paused: Option<PauseReason>,
    pub shadow_started_at: DateTime<Utc>,
    pub reviewed_decisions: u32,
    pub consecutive_sla_breaches: u32,
    pub drift: DriftReport,
    pub ticket: PromotionTicket,
}

#[derive(Debug)]
struct ShadowRecord {
    reviewed: bool,
}

#[derive(Debug)]
struct PipelineState {
    ramp: RampStage,
    paused: Option<PauseReason>,
    shadow_started_at: DateTime<Utc>,
    reviewed: u32,
    drift: DriftMonitor,
    sla: SlaTracker,
}

pub struct PromotionPipeline {
    ledger: Arc<Ledger>,
    gate: Arc<GateEngine>,
    signal: Arc<SignalEngine>,
    clock: Arc<dyn Clock>,
    escalation: Arc<dyn EscalationSink>,
    config: PipelineConfig,
    limiter: HourlyRateLimiter,
    state: Mutex<PipelineState>,
    decisions: DashMap<Uuid, ShadowRecord>,
    promotions: DashMap<CandidateId, PromotionRecord>,
}

impl PromotionPipeline {
    /// Create a pipeline in shadow mode, with the shadow window starting now.
    pub fn new(
        ledger: Arc<Ledger>,
        gate: Arc<GateEngine>,
        signal: Arc<SignalEngine>,
        clock: Arc<dyn Clock>,
        escalation: Arc<dyn EscalationSink>,
        config: PipelineConfig,
    ) -> Self {
        let state = PipelineState {
            ramp: RampStage::Shadow,
            paused: None,
            shadow_started_at: clock.now(),
            reviewed: 0,
            drift: DriftMonitor::new(
                config.drift_window,
                config.drift_min_samples,
                config.drift_floor,
            ),
            sla: SlaTracker::new(config.sla_ceilings_ms.clone(), config.sla_breach_limit),
        };
        Self {
            ledger,
            gate,
            signal,
            limiter: HourlyRateLimiter::new(config.hourly_cap, Arc::clone(&clock)),
            clock,
            escalation,
            config,
            state: Mutex::new(state),
            decisions: DashMap::new(),
            promotions: DashMap::new(),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn rate_limiter(&self) -> &HourlyRateLimiter {
        &self.limiter
    }

    pub fn status(&self) -> PipelineStatus {
        let state = self.state.lock();
        PipelineStatus {
            ramp: state.ramp,
            paused: state.paused,
            shadow_started_at: state.shadow_started_at,
            reviewed_decisions: state.reviewed,
            consecutive_sla_breaches: state.sla.consecutive(),
            drift: state.drift.report(),
            ticket: self.limiter.snapshot(),
        }
    }

    pub fn promotion(&self, candidate_id: &CandidateId) -> Option<PromotionRecord> {
        self.promotions.get(candidate_id).map(|p| p.clone())
    }

    fn append(&self, payload: EntryPayload, actor: &SignerIdentity) -> PipelineResult<LedgerEntry> {
        Ok(self.ledger.append(PIPELINE_SCOPE, payload, actor.clone())?)
    }

    fn event(
        &self,
        event: PipelineEventKind,
        detail: String,
        actor: &SignerIdentity,
    ) -> PipelineResult<LedgerEntry> {
        self.append(EntryPayload::PipelineEvent { event, detail }, actor)
    }

    // ------------------------------------------------------------------
    // Promotion
    // ------------------------------------------------------------------

    /// Run one candidate through the pipeline.
    ///
    /// Every committed outcome consumes a slot of the hourly budget; a failed
    /// attempt hands its slot back. Outside
    /// the live ramp slice the outcome is only logged as a shadow decision.
    pub fn promote(
        &self,
        request: PromotionRequest,
        actor: &SignerIdentity,
    ) -> PipelineResult<PromotionOutcome> {
        let started = Instant::now();
        let (ramp, paused) = {
            let state = self.state.lock();
            (state.ramp, state.paused)
        };
        let percent = ramp.percent();
        let live = percent > 0 && in_ramp_slice(&request.candidate_id, percent);
        let mode = if live { "live" } else { "shadow" };

        if let Some(reason) = paused {
            Metrics::promotion(mode, "paused");
            debug!(candidate_id = %request.candidate_id, %reason, "Promotion refused: pipeline paused");
            return Err(PipelineError::Paused { reason });
        }
        let ticket = match self.limiter.try_acquire() {
            Ok(ticket) => ticket,
            Err(e) => {
                Metrics::promotion(mode, "rate_limited");
                return Err(e);
            }
        };

        let outcome = if live {
            self.promote_live(&request, percent, actor)
        } else {
            self.promote_shadow(&request, actor)
        };
        if outcome.is_err() {
            self.limiter.release(&ticket);
        }
        Metrics::promotion(mode, if outcome.is_ok() { "ok" } else { "failed" });

        if let Err(e) = self.record_stage_latency(PROMOTION_STAGE, started.elapsed()) {
            if !matches!(e, PipelineError::UnknownSlaStage(_)) {
                error!(error = %e, "Failed to record promotion latency");
            }
        }
        outcome
    }

    /// Why `request` would not be promoted, if anything stands in the way.
    fn assess(&self, request: &PromotionRequest) -> Option<String> {
        if let Err(e) = self.qualify(&request.artifact_id) {
            return Some(e.to_string());
        }
        self.signal
            .would_accept(&request.candidate_id, request.confidence, SignalStateKind::Primed)
            .err()
            .map(|e| e.to_string())
    }

    fn qualify(&self, artifact_id: &ArtifactId) -> PipelineResult<()> {
        let record = self.gate.record(artifact_id)?;
        if record.current_stage < self.config.required_stage {
            return Err(PipelineError::NotQualified {
                artifact_id: artifact_id.clone(),
                stage: record.current_stage,
                required: self.config.required_stage,
            });
        }
        Ok(())
    }

    fn promote_shadow(
        &self,
        request: &PromotionRequest,
        actor: &SignerIdentity,
    ) -> PipelineResult<PromotionOutcome> {
        let blocker = self.assess(request);
        let would_promote = blocker.is_none();
        let reason = blocker.unwrap_or_else(|| "all checks passed".to_string());
        let decision_id = Uuid::new_v4();

        self.append(
            EntryPayload::ShadowDecision {
                decision_id,
                candidate_id: request.candidate_id.clone(),
                artifact_id: request.artifact_id.clone(),
                would_promote,
                reason: reason.clone(),
            },
            actor,
        )?;
        self.decisions
            .insert(decision_id, ShadowRecord { reviewed: false });
        debug!(
            candidate_id = %request.candidate_id,
            %decision_id,
            would_promote,
            reason = %reason,
            "Shadow decision logged"
        );
        Ok(PromotionOutcome::Shadow {
            decision_id,
            would_promote,
            reason,
        })
    }

    fn promote_live(
        &self,
        request: &PromotionRequest,
        percent: u8,
        actor: &SignerIdentity,
    ) -> PipelineResult<PromotionOutcome> {
        self.qualify(&request.artifact_id)?;
        match self
            .signal
            .register(request.candidate_id.clone(), request.confidence, actor)
        {
            Ok(_) | Err(SignalError::AlreadyRegistered(_)) => {}
            Err(e) => return Err(e.into()),
        }
        self.signal
            .transition(&request.candidate_id, SignalStateKind::Primed, actor)?;

        let entry = self.append(
            EntryPayload::PromotionCommitted {
                candidate_id: request.candidate_id.clone(),
                artifact_id: request.artifact_id.clone(),
                ramp_percent: percent,
            },
            actor,
        )?;
        let committed_at = entry.timestamp();
        self.promotions.insert(
            request.candidate_id.clone(),
            PromotionRecord {
                candidate_id: request.candidate_id.clone(),
                artifact_id: request.artifact_id.clone(),
                committed_at,
                ramp_percent: percent,
                reverted: false,
            },
        );
        info!(
            candidate_id = %request.candidate_id,
            artifact_id = %request.artifact_id,
            ramp_percent = percent,
            "Candidate promoted"
        );
        Ok(PromotionOutcome::Promoted {
            candidate_id: request.candidate_id.clone(),
            ramp_percent: percent,
            committed_at,
        })
    }

    // ------------------------------------------------------------------
    // Shadow review and ramp
    // ------------------------------------------------------------------

    /// Mark a shadow decision as reviewed by a human. Returns the total
    /// reviewed count.
    pub fn record_review(
        &self,
        decision_id: Uuid,
        agreed: bool,
        reviewer: &SignerIdentity,
    ) -> PipelineResult<u32> {
        let mut decision = self
            .decisions
            .get_mut(&decision_id)
            .ok_or(PipelineError::UnknownDecision(decision_id))?;
        if decision.reviewed {
            return Err(PipelineError::AlreadyReviewed(decision_id));
        }
        self.event(
            PipelineEventKind::ShadowReviewed,
            format!("decision {decision_id} reviewed (agreed: {agreed})"),
            reviewer,
        )?;
        decision.reviewed = true;
        let mut state = self.state.lock();
        state.reviewed += 1;
        Ok(state.reviewed)
    }

    /// Widen live traffic one step. Leaving shadow mode needs the window
    /// to have expired and enough reviewed decisions.
    pub fn advance_ramp(&self, actor: &SignerIdentity) -> PipelineResult<RampStage> {
        let mut state = self.state.lock();
        if let Some(reason) = state.paused {
            return Err(PipelineError::Paused { reason });
        }
        let next = state.ramp.next().ok_or(PipelineError::FullyRamped)?;
        if state.ramp == RampStage::Shadow {
            let until = state.shadow_started_at + Duration::seconds(self.config.shadow_window_secs);
            if self.clock.now() < until {
                return Err(PipelineError::ShadowWindowOpen { until });
            }
            if state.reviewed < self.config.min_reviewed_decisions {
                return Err(PipelineError::InsufficientReviews {
                    reviewed: state.reviewed,
                    required: self.config.min_reviewed_decisions,
                });
            }
        }
        self.event(
            PipelineEventKind::RampAdvanced,
            format!("{} -> {}", state.ramp, next),
            actor,
        )?;
        info!(from = %state.ramp, to = %next, percent = next.percent(), "Ramp advanced");
        state.ramp = next;
        Ok(next)
    }

    // ------------------------------------------------------------------
    // Monitoring
    // ------------------------------------------------------------------

    /// Add a quality sample. A breach of the drift floor pauses new
    /// promotions; candidates already in flight are left alone.
    pub fn record_quality(&self, score: Decimal) -> PipelineResult<DriftReport> {
        let mut state = self.state.lock();
        let report = state.drift.record(score);
        if let Some(mean) = state.drift.mean_f64() {
            Metrics::drift_score(mean);
        }
        if report.breached && state.paused.is_none() {
            let detail = format!(
                "rolling quality mean {} below floor {} over {} samples",
                report.mean.unwrap_or_default(),
                self.config.drift_floor,
                report.samples
            );
            warn!(detail = %detail, "Drift breach");
            self.event(PipelineEventKind::DriftBreach, detail.clone(), &system())?;
            self.pause_locked(&mut state, PauseReason::Drift, &system())?;
            self.escalate(EscalationKind::DriftBreach, Severity::Warning, detail);
        }
        Ok(report)
    }

    /// Report a stage latency. The configured number of consecutive
    /// breaches pauses the pipeline until a manual resume.
    pub fn record_stage_latency(
        &self,
        stage: &str,
        latency: StdDuration,
    ) -> PipelineResult<SlaReport> {
        let mut state = self.state.lock();
        let report = state.sla.record(stage, latency)?;
        Metrics::stage_latency(stage, latency.as_secs_f64() * 1_000.0);
        if !report.breached {
            return Ok(report);
        }

        Metrics::sla_breach(stage);
        warn!(
            stage,
            latency_ms = report.latency_ms,
            ceiling_ms = report.ceiling_ms,
            consecutive = report.consecutive,
            "SLA breach"
        );
        self.event(
            PipelineEventKind::SlaBreach,
            format!(
                "{stage}: {}ms over {}ms ceiling ({} consecutive)",
                report.latency_ms, report.ceiling_ms, report.consecutive
            ),
            &system(),
        )?;
        if report.limit_reached && state.paused.is_none() {
            self.pause_locked(&mut state, PauseReason::Sla, &system())?;
            self.escalate(
                EscalationKind::SlaBreach,
                Severity::Critical,
                format!("{} consecutive SLA breaches, last on {stage}", report.consecutive),
            );
        }
        Ok(report)
    }

    // ------------------------------------------------------------------
    // Pause / resume
    // ------------------------------------------------------------------

    pub fn pause(&self, actor: &SignerIdentity) -> PipelineResult<()> {
        let mut state = self.state.lock();
        if state.paused.is_some() {
            return Ok(());
        }
        self.pause_locked(&mut state, PauseReason::Manual, actor)
    }

    fn pause_locked(
        &self,
        state: &mut PipelineState,
        reason: PauseReason,
        actor: &SignerIdentity,
    ) -> PipelineResult<()> {
        self.event(PipelineEventKind::Paused, reason.as_str().to_string(), actor)?;
        state.paused = Some(reason);
        Metrics::pipeline_paused(true);
        warn!(%reason, "Promotion pipeline paused");
        Ok(())
    }

    /// Lift a pause. Monitor state starts over so a stale window cannot
    /// re-trigger immediately.
    pub fn resume(&self, actor: &SignerIdentity, reason: &str) -> PipelineResult<()> {
        let mut state = self.state.lock();
        let paused = state.paused.ok_or(PipelineError::NotPaused)?;
        self.event(
            PipelineEventKind::Resumed,
            format!("resumed after {paused} pause: {reason}"),
            actor,
        )?;
        state.paused = None;
        state.drift.reset();
        state.sla.reset();
        Metrics::pipeline_paused(false);
        info!(operator = %actor, previous = %paused, reason, "Promotion pipeline resumed");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Reversal
    // ------------------------------------------------------------------

    /// Undo a live promotion inside the rollback window by standing the
    /// candidate down.
    pub fn undo_promotion(
        &self,
        candidate_id: &CandidateId,
        reason: &str,
        actor: &SignerIdentity,
    ) -> PipelineResult<SignalState> {
        let mut promotion = self
            .promotions
            .get_mut(candidate_id)
            .ok_or_else(|| PipelineError::UnknownPromotion(candidate_id.clone()))?;
        if promotion.reverted {
            return Err(PipelineError::AlreadyReverted(candidate_id.clone()));
        }
        let expired_at =
            promotion.committed_at + Duration::seconds(self.config.rollback_window_secs);
        if self.clock.now() > expired_at {
            warn!(%candidate_id, expired_at = %expired_at, "Undo refused: rollback window closed");
            return Err(PipelineError::RollbackWindowExpired {
                candidate_id: candidate_id.clone(),
                expired_at,
            });
        }

        self.append(
            EntryPayload::PromotionReverted {
                candidate_id: candidate_id.clone(),
                artifact_id: promotion.artifact_id.clone(),
                reason: reason.to_string(),
            },
            actor,
        )?;
        promotion.reverted = true;
        drop(promotion);

        let state = self.signal.stand_down(candidate_id, reason, actor)?;
        info!(%candidate_id, state = %state.state, "Promotion undone");
        Ok(state)
    }

    /// Past the undo window, reversal is a gate rollback of the promoted
    /// artifact and needs its dual signoff.
    pub fn request_full_rollback(
        &self,
        candidate_id: &CandidateId,
        target: Stage,
        reason: &str,
        requester: &SignerIdentity,
    ) -> PipelineResult<GateRecord> {
        let artifact_id = self
            .promotions
            .get(candidate_id)
            .map(|p| p.artifact_id.clone())
            .ok_or_else(|| PipelineError::UnknownPromotion(candidate_id.clone()))?;
        Ok(self
            .gate
            .request_rollback(&artifact_id, target, reason, requester)?)
    }

    fn escalate(&self, kind: EscalationKind, severity: Severity, detail: String) {
        Metrics::escalation(kind.as_str());
        if let Err(e) = self.append(
            EntryPayload::Escalation {
                kind,
                detail: detail.clone(),
            },
            &system(),
        ) {
            error!(error = %e, kind = %kind, "Failed to record escalation");
        }
        self.escalation.escalate(EscalationEvent::new(
            kind,
            severity,
            "pipeline",
            detail,
            self.clock.now(),
        ));
    }
}

fn system() -> SignerIdentity {
    SignerIdentity::from(SYSTEM_ACTOR)
}
