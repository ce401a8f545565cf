use bastion_core::{CandidateId, SignalStateKind};
use bastion_ledger::EntryId;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

/// One accepted transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransitionRecord {
    pub from: SignalStateKind,
    pub to: SignalStateKind,
    pub at: DateTime<Utc>,
    pub entry: EntryId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignalState {
    pub candidate_id: CandidateId,
    pub state: SignalStateKind,
    pub confidence: Decimal,
    pub entered_at: DateTime<Utc>,
    /// Ticks spent in the current COOLING stay.
    pub cooling_cycles: u32,
    pub transition_log: Vec<TransitionRecord>,
}

impl SignalState {
    pub(crate) fn new(candidate_id: CandidateId, confidence: Decimal, now: DateTime<Utc>) -> Self {
        Self {
            candidate_id,
            state: SignalStateKind::Dormant,
            confidence,
            entered_at: now,
            cooling_cycles: 0,
            transition_log: Vec::new(),
        }
    }

    pub(crate) fn enter(&mut self, to: SignalStateKind, at: DateTime<Utc>, entry: EntryId) {
        self.transition_log.push(TransitionRecord {
            from: self.state,
            to,
            at,
            entry,
        });
        self.state = to;
        self.entered_at = at;
        self.cooling_cycles = 0;
    }
}
