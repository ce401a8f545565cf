use std::sync::Arc;

use bastion_core::{CandidateId, Clock, SignalStateKind, SignerIdentity};
use bastion_ledger::{EntryPayload, Ledger, LedgerEntry};
use bastion_oracle::ContextOracle;
use bastion_telemetry::Metrics;
use dashmap::DashMap;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use tracing::{debug, error, info, warn};

use crate::config::SignalConfig;
use crate::error::{SignalError, SignalResult};
use crate::state::SignalState;

/// Scope of the chain recording signal transitions.
pub const SIGNAL_SCOPE: &str = "signal";

/// Identity recorded for transitions driven by `tick`.
pub const SYSTEM_ACTOR: &str = "system:signal";

pub struct SignalEngine {
    ledger: Arc<Ledger>,
    oracle: Arc<ContextOracle>,
    clock: Arc<dyn Clock>,
    config: SignalConfig,
    candidates: DashMap<CandidateId, Arc<Mutex<SignalState>>>,
}

impl SignalEngine {
    pub fn new(
        ledger: Arc<Ledger>,
        oracle: Arc<ContextOracle>,
        clock: Arc<dyn Clock>,
        config: SignalConfig,
    ) -> Self {
        Self {
            ledger,
            oracle,
            clock,
            config,
            candidates: DashMap::new(),
        }
    }

    pub fn config(&self) -> &SignalConfig {
        &self.config
    }

    fn handle(&self, candidate_id: &CandidateId) -> SignalResult<Arc<Mutex<SignalState>>> {
        self.candidates
            .get(candidate_id)
            .map(|c| Arc::clone(&c))
            .ok_or_else(|| SignalError::UnknownCandidate(candidate_id.clone()))
    }

    /// Start tracking a candidate in DORMANT.
    pub fn register(
        &self,
        candidate_id: CandidateId,
        confidence: Decimal,
        actor: &SignerIdentity,
    ) -> SignalResult<SignalState> {
        if confidence < Decimal::ZERO || confidence > Decimal::ONE {
            return Err(SignalError::InvalidConfidence(confidence));
        }
        match self.candidates.entry(candidate_id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(SignalError::AlreadyRegistered(candidate_id))
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                self.ledger.append(
                    SIGNAL_SCOPE,
                    EntryPayload::SignalRegistered {
                        candidate_id: candidate_id.clone(),
                        confidence,
                    },
                    actor.clone(),
                )?;
                let state = SignalState::new(candidate_id, confidence, self.clock.now());
                info!(candidate_id = %state.candidate_id, %confidence, "Candidate registered");
                slot.insert(Arc::new(Mutex::new(state.clone())));
                Ok(state)
            }
        }
    }

    pub fn state(&self, candidate_id: &CandidateId) -> Option<SignalState> {
        self.candidates.get(candidate_id).map(|c| c.lock().clone())
    }

    pub fn states(&self) -> Vec<SignalState> {
        self.candidates.iter().map(|c| c.lock().clone()).collect()
    }

    /// Request `to` for a candidate. Refusals are logged and leave the state
    /// untouched.
    pub fn transition(
        &self,
        candidate_id: &CandidateId,
        to: SignalStateKind,
        actor: &SignerIdentity,
    ) -> SignalResult<SignalState> {
        let handle = self.handle(candidate_id)?;
        let mut state = handle.lock();

        if let Err(err) = self.check(&state, to, true) {
            return Err(self.reject(&state, to, err, actor));
        }
        self.commit(&mut state, to, None, actor)?;
        Ok(state.clone())
    }

    /// Whether `to` would currently be accepted for a candidate at `from`
    /// with `confidence`. Nothing is logged and nothing escalates.
    pub fn would_accept(
        &self,
        candidate_id: &CandidateId,
        confidence: Decimal,
        to: SignalStateKind,
    ) -> SignalResult<()> {
        let probe = match self.state(candidate_id) {
            Some(mut existing) => {
                existing.confidence = confidence;
                existing
            }
            None => SignalState::new(candidate_id.clone(), confidence, self.clock.now()),
        };
        self.check(&probe, to, false)
    }

    /// Move one legal step towards DORMANT: PRIMED and EXECUTING return
    /// directly, HOLDING starts cooling. COOLING and DORMANT are unchanged.
    pub fn stand_down(
        &self,
        candidate_id: &CandidateId,
        reason: &str,
        actor: &SignerIdentity,
    ) -> SignalResult<SignalState> {
        let handle = self.handle(candidate_id)?;
        let mut state = handle.lock();
        let to = match state.state {
            SignalStateKind::Primed | SignalStateKind::Executing => SignalStateKind::Dormant,
            SignalStateKind::Holding => SignalStateKind::Cooling,
            SignalStateKind::Cooling | SignalStateKind::Dormant => return Ok(state.clone()),
        };
        self.commit(&mut state, to, Some(reason.to_string()), actor)?;
        Ok(state.clone())
    }

    /// Advance every COOLING candidate by one cycle and return those whose
    /// dwell completed to DORMANT.
    pub fn tick(&self) -> Vec<CandidateId> {
        let actor = SignerIdentity::from(SYSTEM_ACTOR);
        let handles: Vec<_> = self
            .candidates
            .iter()
            .map(|c| Arc::clone(c.value()))
            .collect();

        let mut cooled = Vec::new();
        for handle in handles {
            let mut state = handle.lock();
            if state.state != SignalStateKind::Cooling {
                continue;
            }
            state.cooling_cycles += 1;
            if state.cooling_cycles < self.config.cooling_min_cycles {
                debug!(
                    candidate_id = %state.candidate_id,
                    cycles = state.cooling_cycles,
                    required = self.config.cooling_min_cycles,
                    "Cooling"
                );
                continue;
            }
            match self.commit(
                &mut state,
                SignalStateKind::Dormant,
                Some("cooling complete".to_string()),
                &actor,
            ) {
                Ok(()) => cooled.push(state.candidate_id.clone()),
                Err(e) => error!(
                    candidate_id = %state.candidate_id,
                    error = %e,
                    "Failed to return cooled candidate to DORMANT"
                ),
            }
        }
        cooled
    }

    /// Candidate history from the ledger, oldest first.
    pub fn history(&self, candidate_id: &CandidateId) -> SignalResult<Vec<LedgerEntry>> {
        Ok(self.ledger.find(SIGNAL_SCOPE, |e| {
            e.payload().candidate_id() == Some(candidate_id)
        })?)
    }

    fn check(&self, state: &SignalState, to: SignalStateKind, escalate: bool) -> SignalResult<()> {
        let from = state.state;
        if !from.can_transition_to(to) {
            return Err(SignalError::InvalidTransition {
                candidate_id: state.candidate_id.clone(),
                from,
                to,
            });
        }
        if from == SignalStateKind::Cooling && state.cooling_cycles < self.config.cooling_min_cycles
        {
            return Err(SignalError::DwellNotElapsed {
                candidate_id: state.candidate_id.clone(),
                elapsed: state.cooling_cycles,
                required: self.config.cooling_min_cycles,
            });
        }
        if matches!(to, SignalStateKind::Primed | SignalStateKind::Executing) {
            let decision = if escalate {
                self.oracle.validate_candidate_execution(state.confidence)
            } else {
                self.oracle.check_candidate_execution(state.confidence)
            };
            decision.map_err(|e| SignalError::from_oracle(&state.candidate_id, e))?;
        }
        Ok(())
    }

    fn commit(
        &self,
        state: &mut SignalState,
        to: SignalStateKind,
        reason: Option<String>,
        actor: &SignerIdentity,
    ) -> SignalResult<()> {
        let from = state.state;
        let entry = self.ledger.append(
            SIGNAL_SCOPE,
            EntryPayload::SignalTransition {
                candidate_id: state.candidate_id.clone(),
                from,
                to,
                accepted: true,
                reason,
            },
            actor.clone(),
        )?;
        state.enter(to, entry.timestamp(), entry.id());
        Metrics::signal_transition(from.as_str(), to.as_str(), "accepted");
        info!(candidate_id = %state.candidate_id, from = %from, to = %to, "Signal transition");
        Ok(())
    }

    fn reject(
        &self,
        state: &SignalState,
        to: SignalStateKind,
        err: SignalError,
        actor: &SignerIdentity,
    ) -> SignalError {
        let from = state.state;
        Metrics::signal_transition(from.as_str(), to.as_str(), "rejected");
        warn!(
            candidate_id = %state.candidate_id,
            from = %from,
            to = %to,
            error = %err,
            "Signal transition rejected"
        );
        let payload = EntryPayload::SignalTransition {
            candidate_id: state.candidate_id.clone(),
            from,
            to,
            accepted: false,
            reason: Some(err.to_string()),
        };
        if let Err(e) = self.ledger.append(SIGNAL_SCOPE, payload, actor.clone()) {
            error!(candidate_id = %state.candidate_id, error = %e, "Failed to record rejected transition");
        }
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bastion_core::{
        ChannelEscalationSink, ContextSnapshot, EscalationEvent, LiquidityState, LogEscalationSink,
        ManualClock, Regime, VolatilityState,
    };
    use bastion_ledger::{LedgerConfig, MemoryStore};
    use bastion_oracle::OracleConfig;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    struct Fixture {
        engine: SignalEngine,
        ledger: Arc<Ledger>,
        oracle: Arc<ContextOracle>,
        clock: Arc<ManualClock>,
        escalations: tokio::sync::mpsc::UnboundedReceiver<EscalationEvent>,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(ManualClock::default());
        let ledger = Arc::new(
            Ledger::open(
                Arc::new(MemoryStore::new()),
                clock.clone(),
                Arc::new(LogEscalationSink),
                LedgerConfig::default(),
            )
            .unwrap(),
        );
        let (sink, escalations) = ChannelEscalationSink::new();
        let (oracle, _rx) = ContextOracle::new(OracleConfig::default(), clock.clone(), Arc::new(sink));
        let oracle = Arc::new(oracle);
        let engine = SignalEngine::new(
            Arc::clone(&ledger),
            Arc::clone(&oracle),
            clock.clone(),
            SignalConfig::default(),
        );
        Fixture {
            engine,
            ledger,
            oracle,
            clock,
            escalations,
        }
    }

    fn refresh(f: &Fixture) {
        f.oracle
            .refresh(ContextSnapshot {
                regime: Regime::RangeBound,
                regime_confidence: dec!(0.9),
                volatility_state: VolatilityState::Normal,
                liquidity_state: LiquidityState::Normal,
                captured_at: f.clock.now(),
            })
            .unwrap();
    }

    fn operator() -> SignerIdentity {
        SignerIdentity::from("ops-1")
    }

    fn rejected_entries(f: &Fixture, id: &CandidateId) -> usize {
        f.engine
            .history(id)
            .unwrap()
            .iter()
            .filter(|e| {
                matches!(
                    e.payload(),
                    EntryPayload::SignalTransition { accepted: false, .. }
                )
            })
            .count()
    }

    #[test]
    fn test_skip_to_executing_rejected_then_legal_path() {
        let f = fixture();
        refresh(&f);
        let id = CandidateId::from("cand-1");
        f.engine.register(id.clone(), dec!(0.8), &operator()).unwrap();

        let err = f
            .engine
            .transition(&id, SignalStateKind::Executing, &operator())
            .unwrap_err();
        assert!(matches!(err, SignalError::InvalidTransition { .. }));
        assert_eq!(f.engine.state(&id).unwrap().state, SignalStateKind::Dormant);
        assert_eq!(rejected_entries(&f, &id), 1);

        f.engine
            .transition(&id, SignalStateKind::Primed, &operator())
            .unwrap();
        let state = f
            .engine
            .transition(&id, SignalStateKind::Executing, &operator())
            .unwrap();
        assert_eq!(state.state, SignalStateKind::Executing);
        assert_eq!(state.transition_log.len(), 2);
        assert_eq!(state.transition_log[0].from, SignalStateKind::Dormant);
        assert_eq!(state.transition_log[1].to, SignalStateKind::Executing);
    }

    #[test]
    fn test_adjacency_never_left() {
        let f = fixture();
        refresh(&f);
        let id = CandidateId::from("cand-adj");
        f.engine.register(id.clone(), dec!(0.9), &operator()).unwrap();

        for to in SignalStateKind::ALL {
            let before = f.engine.state(&id).unwrap().state;
            let result = f.engine.transition(&id, to, &operator());
            let after = f.engine.state(&id).unwrap().state;
            if before.can_transition_to(to) {
                assert!(result.is_ok(), "{before} -> {to} should be accepted");
                assert_eq!(after, to);
            } else {
                assert!(result.is_err());
                assert_eq!(after, before);
            }
        }
    }

    #[test]
    fn test_unavailable_context_blocks_priming() {
        let f = fixture();
        let id = CandidateId::from("cand-2");
        f.engine.register(id.clone(), dec!(0.95), &operator()).unwrap();

        let err = f
            .engine
            .transition(&id, SignalStateKind::Primed, &operator())
            .unwrap_err();
        assert!(matches!(err, SignalError::ContextUnavailable { .. }));
        assert!(err.is_human_intervention_required());
        assert_eq!(f.engine.state(&id).unwrap().state, SignalStateKind::Dormant);
        assert_eq!(rejected_entries(&f, &id), 1);
    }

    #[test]
    fn test_degraded_context_needs_confidence() {
        let f = fixture();
        refresh(&f);
        f.clock.advance(Duration::seconds(120));
        let weak = CandidateId::from("weak");
        let strong = CandidateId::from("strong");
        f.engine.register(weak.clone(), dec!(0.6), &operator()).unwrap();
        f.engine.register(strong.clone(), dec!(0.9), &operator()).unwrap();

        assert!(matches!(
            f.engine.transition(&weak, SignalStateKind::Primed, &operator()),
            Err(SignalError::ContextInsufficient { .. })
        ));
        assert!(f
            .engine
            .transition(&strong, SignalStateKind::Primed, &operator())
            .is_ok());
    }

    #[test]
    fn test_cooling_dwell_and_tick() {
        let f = fixture();
        refresh(&f);
        let id = CandidateId::from("cand-3");
        f.engine.register(id.clone(), dec!(0.9), &operator()).unwrap();
        for to in [
            SignalStateKind::Primed,
            SignalStateKind::Executing,
            SignalStateKind::Holding,
            SignalStateKind::Cooling,
        ] {
            f.engine.transition(&id, to, &operator()).unwrap();
        }

        let err = f
            .engine
            .transition(&id, SignalStateKind::Dormant, &operator())
            .unwrap_err();
        assert!(matches!(
            err,
            SignalError::DwellNotElapsed {
                elapsed: 0,
                required: 3,
                ..
            }
        ));

        assert!(f.engine.tick().is_empty());
        assert!(f.engine.tick().is_empty());
        assert_eq!(f.engine.state(&id).unwrap().cooling_cycles, 2);
        assert_eq!(f.engine.tick(), vec![id.clone()]);

        let state = f.engine.state(&id).unwrap();
        assert_eq!(state.state, SignalStateKind::Dormant);
        assert_eq!(state.cooling_cycles, 0);
        let last = f.engine.history(&id).unwrap().pop().unwrap();
        assert_eq!(last.signer().as_str(), SYSTEM_ACTOR);
    }

    #[test]
    fn test_stand_down_follows_legal_edges() {
        let f = fixture();
        refresh(&f);
        let id = CandidateId::from("cand-4");
        f.engine.register(id.clone(), dec!(0.9), &operator()).unwrap();
        f.engine
            .transition(&id, SignalStateKind::Primed, &operator())
            .unwrap();

        let state = f.engine.stand_down(&id, "undo", &operator()).unwrap();
        assert_eq!(state.state, SignalStateKind::Dormant);
        let unchanged = f.engine.stand_down(&id, "undo", &operator()).unwrap();
        assert_eq!(unchanged.transition_log.len(), 2);
    }

    #[test]
    fn test_would_accept_has_no_side_effects() {
        let mut f = fixture();
        refresh(&f);
        let id = CandidateId::from("cand-dry");
        assert!(f
            .engine
            .would_accept(&id, dec!(0.9), SignalStateKind::Primed)
            .is_ok());
        assert!(f.engine.state(&id).is_none());
        assert!(f.ledger.head(SIGNAL_SCOPE).is_none());

        f.clock.advance(Duration::seconds(301));
        assert!(matches!(
            f.engine.would_accept(&id, dec!(0.9), SignalStateKind::Primed),
            Err(SignalError::ContextUnavailable { .. })
        ));
        assert!(f.escalations.try_recv().is_err());
        assert!(f.ledger.head(SIGNAL_SCOPE).is_none());
    }

    #[test]
    fn test_registration_checks() {
        let f = fixture();
        let id = CandidateId::from("dup");
        assert!(matches!(
            f.engine.register(id.clone(), dec!(1.5), &operator()),
            Err(SignalError::InvalidConfidence(_))
        ));
        f.engine.register(id.clone(), dec!(0.5), &operator()).unwrap();
        assert!(matches!(
            f.engine.register(id.clone(), dec!(0.5), &operator()),
            Err(SignalError::AlreadyRegistered(_))
        ));
        assert!(matches!(
            f.engine.transition(
                &CandidateId::from("ghost"),
                SignalStateKind::Primed,
                &operator()
            ),
            Err(SignalError::UnknownCandidate(_))
        ));
    }
}
