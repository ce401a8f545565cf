//! Per-scope hash chains with epochs.
//!
//! The registry maps each scope to its epoch segments in order; only the last
//! segment of a scope accepts writes. Each segment owns its head behind a
//! mutex, so appends serialize per chain while different scopes proceed in
//! parallel.

use std::ops::{Bound, RangeBounds};
use std::sync::Arc;

use bastion_core::{
    Clock, Digest, EscalationEvent, EscalationKind, EscalationSink, Severity, SignerIdentity,
};
use bastion_telemetry::Metrics;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::entry::{validate_scope, ChainId, EntryId, LedgerEntry};
use crate::error::{LedgerError, LedgerResult};
use crate::payload::EntryPayload;
use crate::store::LedgerStore;

/// Scope receiving immutable-violation records.
pub const AUDIT_SCOPE: &str = "ledger-audit";

fn default_max_append_retries() -> u32 {
    8
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Attempts before `append` gives up on a contended scope.
    #[serde(default = "default_max_append_retries")]
    pub max_append_retries: u32,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            max_append_retries: default_max_append_retries(),
        }
    }
}

/// Current tip of a chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainHead {
    pub chain_id: ChainId,
    pub sequence: u64,
    pub hash: Digest,
    pub halted: bool,
}

/// Outcome of `verify_chain`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainVerification {
    pub chain_id: ChainId,
    /// Entries whose hash was recomputed.
    pub checked: usize,
    pub valid: bool,
    /// First sequence that failed linkage, hash or presence checks.
    pub broken_at: Option<u64>,
}

#[derive(Debug)]
struct SegmentState {
    head: Digest,
    last_sequence: u64,
    retired: bool,
    /// Sequence at which verification found a break.
    halted: Option<u64>,
}

#[derive(Debug)]
struct Segment {
    chain_id: ChainId,
    state: Mutex<SegmentState>,
}

impl Segment {
    fn empty(chain_id: ChainId) -> Arc<Self> {
        Self::at(chain_id, Digest::GENESIS, 0, false)
    }

    fn at(chain_id: ChainId, head: Digest, last_sequence: u64, retired: bool) -> Arc<Self> {
        Arc::new(Self {
            chain_id,
            state: Mutex::new(SegmentState {
                head,
                last_sequence,
                retired,
                halted: None,
            }),
        })
    }
}

/// The ledger service.
pub struct Ledger {
    store: Arc<dyn LedgerStore>,
    clock: Arc<dyn Clock>,
    escalation: Arc<dyn EscalationSink>,
    config: LedgerConfig,
    segments: DashMap<String, Vec<Arc<Segment>>>,
}

impl Ledger {
    /// Open a ledger over `store`, rebuilding chain heads from its contents.
    pub fn open(
        store: Arc<dyn LedgerStore>,
        clock: Arc<dyn Clock>,
        escalation: Arc<dyn EscalationSink>,
        config: LedgerConfig,
    ) -> LedgerResult<Self> {
        let segments: DashMap<String, Vec<Arc<Segment>>> = DashMap::new();
        let chains = store.chains()?;
        for chain in &chains {
            let (head, last_sequence) = match store.last(chain)? {
                Some(entry) => (*entry.hash_self(), entry.sequence()),
                None => (Digest::GENESIS, 0),
            };
            segments
                .entry(chain.scope.clone())
                .or_default()
                .push(Segment::at(chain.clone(), head, last_sequence, true));
        }
        for mut scope in segments.iter_mut() {
            scope.sort_by_key(|s| s.chain_id.epoch);
            if let Some(current) = scope.last() {
                current.state.lock().retired = false;
            }
        }

        info!(
            chains = chains.len(),
            max_append_retries = config.max_append_retries,
            "Ledger opened"
        );

        Ok(Self {
            store,
            clock,
            escalation,
            config,
            segments,
        })
    }

    // ------------------------------------------------------------------
    // Registry
    // ------------------------------------------------------------------

    fn current_segment(&self, scope: &str) -> LedgerResult<Arc<Segment>> {
        if let Some(segments) = self.segments.get(scope) {
            if let Some(current) = segments.last() {
                return Ok(Arc::clone(current));
            }
        }
        validate_scope(scope)?;
        let mut segments = self.segments.entry(scope.to_string()).or_default();
        if segments.is_empty() {
            segments.push(Segment::empty(ChainId::initial(scope)?));
        }
        segments
            .last()
            .map(Arc::clone)
            .ok_or_else(|| LedgerError::Storage(format!("no segment for scope {scope}")))
    }

    fn segment(&self, chain: &ChainId) -> Option<Arc<Segment>> {
        self.segments.get(&chain.scope).and_then(|segments| {
            segments
                .iter()
                .find(|s| s.chain_id.epoch == chain.epoch)
                .map(Arc::clone)
        })
    }

    fn current_chain_of(&self, scope: &str) -> Option<ChainId> {
        self.segments
            .get(scope)
            .and_then(|segments| segments.last().map(|s| s.chain_id.clone()))
    }

    /// Seal and store the next entry. Caller holds the segment lock.
    fn commit_locked(
        &self,
        segment: &Segment,
        state: &mut SegmentState,
        payload: EntryPayload,
        signer: SignerIdentity,
    ) -> LedgerResult<LedgerEntry> {
        let sequence = state.last_sequence + 1;
        let entry = LedgerEntry::seal(
            segment.chain_id.clone(),
            sequence,
            state.head,
            payload,
            signer,
            self.clock.now(),
        )?;
        self.store.insert(entry.clone())?;
        state.head = *entry.hash_self();
        state.last_sequence = sequence;

        Metrics::ledger_append(&segment.chain_id.scope);
        debug!(
            chain = %segment.chain_id,
            sequence,
            event = entry.payload().type_name(),
            hash = %entry.hash_self(),
            "Entry appended"
        );
        Ok(entry)
    }

    fn check_writable(segment: &Segment, state: &SegmentState) -> LedgerResult<()> {
        if let Some(broken_at) = state.halted {
            return Err(LedgerError::ChainBroken {
                chain_id: segment.chain_id.clone(),
                broken_at,
            });
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Append to the current epoch of `scope`, creating the scope on first use.
    ///
    /// A concurrent rotation makes the resolved epoch stale; the append is
    /// then retried against the fresh head, up to `max_append_retries`.
    pub fn append(
        &self,
        scope: &str,
        payload: EntryPayload,
        signer: SignerIdentity,
    ) -> LedgerResult<LedgerEntry> {
        let attempts = self.config.max_append_retries.max(1);
        for attempt in 1..=attempts {
            let segment = self.current_segment(scope)?;
            let mut state = segment.state.lock();
            if state.retired {
                drop(state);
                Metrics::ledger_conflict(scope);
                debug!(scope, attempt, "Append raced a rotation, retrying");
                continue;
            }
            Self::check_writable(&segment, &state)?;
            return self.commit_locked(&segment, &mut state, payload, signer);
        }

        warn!(scope, attempts, "Append retries exhausted");
        Err(LedgerError::RetriesExhausted {
            scope: scope.to_string(),
            attempts,
        })
    }

    /// Compare-and-swap append: succeeds only if `expected_prev` is the head.
    pub fn append_at(
        &self,
        chain: &ChainId,
        expected_prev: Digest,
        payload: EntryPayload,
        signer: SignerIdentity,
    ) -> LedgerResult<LedgerEntry> {
        let segment = match self.segment(chain) {
            Some(segment) => segment,
            None if chain.epoch == 0 => self.current_segment(&chain.scope)?,
            None => return Err(LedgerError::UnknownChain(chain.clone())),
        };
        if segment.chain_id != *chain {
            return Err(LedgerError::UnknownChain(chain.clone()));
        }

        let mut state = segment.state.lock();
        if state.retired {
            let current = self
                .current_chain_of(&chain.scope)
                .unwrap_or_else(|| chain.clone());
            return Err(LedgerError::EpochRetired {
                chain_id: chain.clone(),
                current,
            });
        }
        Self::check_writable(&segment, &state)?;
        if state.head != expected_prev {
            Metrics::ledger_conflict(&chain.scope);
            debug!(
                chain = %chain,
                expected = %expected_prev,
                actual = %state.head,
                "Stale head on compare-and-swap append"
            );
            return Err(LedgerError::HeadMismatch {
                chain_id: chain.clone(),
                expected: expected_prev,
                actual: state.head,
            });
        }
        self.commit_locked(&segment, &mut state, payload, signer)
    }

    /// Retire the current epoch of `scope` and open the next one.
    ///
    /// The new epoch's first entry links to GENESIS and records the retired
    /// epoch's head, so both epochs stay independently verifiable.
    pub fn rotate(
        &self,
        scope: &str,
        reason: &str,
        signer: SignerIdentity,
    ) -> LedgerResult<LedgerEntry> {
        let current = self
            .segments
            .get(scope)
            .and_then(|segments| segments.last().map(Arc::clone))
            .ok_or_else(|| match ChainId::initial(scope) {
                Ok(chain) => LedgerError::UnknownChain(chain),
                Err(e) => e,
            })?;

        let mut state = current.state.lock();
        if state.retired {
            let now_current = self
                .current_chain_of(scope)
                .unwrap_or_else(|| current.chain_id.clone());
            return Err(LedgerError::EpochRetired {
                chain_id: current.chain_id.clone(),
                current: now_current,
            });
        }
        Self::check_writable(&current, &state)?;

        let next = Segment::empty(current.chain_id.next_epoch());
        let payload = EntryPayload::ChainRotated {
            previous: current.chain_id.clone(),
            previous_head: state.head,
            previous_sequence: state.last_sequence,
            reason: reason.to_string(),
        };
        let entry = {
            let mut next_state = next.state.lock();
            self.commit_locked(&next, &mut next_state, payload, signer)?
        };

        state.retired = true;
        self.segments
            .entry(scope.to_string())
            .or_default()
            .push(Arc::clone(&next));

        info!(
            previous = %current.chain_id,
            current = %next.chain_id,
            previous_head = %state.head,
            reason,
            "Chain rotated"
        );
        Ok(entry)
    }

    /// Committed entries are never rewritten; the attempt is recorded.
    pub fn rewrite(
        &self,
        id: &EntryId,
        _replacement: EntryPayload,
        actor: SignerIdentity,
    ) -> LedgerResult<()> {
        Err(self.reject_mutation(id, "rewrite", actor))
    }

    /// Committed entries are never deleted; the attempt is recorded.
    pub fn delete(&self, id: &EntryId, actor: SignerIdentity) -> LedgerResult<()> {
        Err(self.reject_mutation(id, "delete", actor))
    }

    fn reject_mutation(&self, id: &EntryId, attempt: &str, actor: SignerIdentity) -> LedgerError {
        Metrics::ledger_violation(&id.chain.scope, attempt);
        warn!(entry = %id, attempt, actor = %actor, "Immutable violation attempt");

        let payload = EntryPayload::ImmutableViolation {
            target: id.clone(),
            attempt: attempt.to_string(),
            actor: actor.clone(),
        };
        if let Err(e) = self.append(AUDIT_SCOPE, payload, actor) {
            error!(entry = %id, error = %e, "Failed to record immutable violation");
        }
        LedgerError::ImmutableViolation {
            entry_id: id.clone(),
            attempt: attempt.to_string(),
        }
    }

    // ------------------------------------------------------------------
    // Verification
    // ------------------------------------------------------------------

    /// Verify `range` of `chain`, including linkage to the entry before it.
    ///
    /// A break halts the chain until `resume_chain` and raises a
    /// `ChainBroken` escalation.
    pub fn verify_chain(
        &self,
        chain: &ChainId,
        range: impl RangeBounds<u64>,
    ) -> LedgerResult<ChainVerification> {
        let segment = self.segment(chain);
        let stored_last = self.store.last(chain)?.map(|e| e.sequence());
        let known_last = match (&segment, stored_last) {
            (Some(segment), stored) => segment.state.lock().last_sequence.max(stored.unwrap_or(0)),
            (None, Some(stored)) => stored,
            (None, None) => return Err(LedgerError::UnknownChain(chain.clone())),
        };

        let start = match range.start_bound() {
            Bound::Included(&n) => n.max(1),
            Bound::Excluded(&n) => n.saturating_add(1).max(1),
            Bound::Unbounded => 1,
        };
        let end = match range.end_bound() {
            Bound::Included(&n) => n.min(known_last),
            Bound::Excluded(&n) => n.saturating_sub(1).min(known_last),
            Bound::Unbounded => known_last,
        };

        let mut verification = ChainVerification {
            chain_id: chain.clone(),
            checked: 0,
            valid: true,
            broken_at: None,
        };
        if start > end {
            return Ok(verification);
        }

        let mut prev = if start == 1 {
            Some(Digest::GENESIS)
        } else {
            self.store
                .get(&EntryId::new(chain.clone(), start - 1))?
                .map(|e| *e.hash_self())
        };
        let broken_at = match prev {
            None => Some(start - 1),
            Some(ref mut prev) => {
                let entries = self.store.range(chain, start..=end)?;
                scan(&entries, start, end, prev, &mut verification.checked)?
            }
        };

        if let Some(broken_at) = broken_at {
            verification.valid = false;
            verification.broken_at = Some(broken_at);
            self.halt(chain, segment.as_deref(), broken_at);
        } else {
            debug!(chain = %chain, start, end, "Chain range verified");
        }
        Ok(verification)
    }

    fn halt(&self, chain: &ChainId, segment: Option<&Segment>, broken_at: u64) {
        let newly_halted = match segment {
            Some(segment) => {
                let mut state = segment.state.lock();
                let newly = state.halted.is_none();
                let earliest = state.halted.map_or(broken_at, |b| b.min(broken_at));
                state.halted = Some(earliest);
                newly
            }
            None => true,
        };
        if newly_halted {
            Metrics::chain_halted();
        }

        error!(
            chain = %chain,
            broken_at,
            "HASH CHAIN BROKEN - writes halted pending investigation"
        );
        Metrics::escalation(EscalationKind::ChainBroken.as_str());
        self.escalation.escalate(EscalationEvent::new(
            EscalationKind::ChainBroken,
            Severity::Critical,
            "ledger",
            format!("chain {chain} broken at sequence {broken_at}"),
            self.clock.now(),
        ));
    }

    /// Operator action clearing a halt. The resumption is recorded on the
    /// chain itself.
    pub fn resume_chain(
        &self,
        chain: &ChainId,
        operator: SignerIdentity,
        reason: &str,
    ) -> LedgerResult<LedgerEntry> {
        let segment = self
            .segment(chain)
            .ok_or_else(|| LedgerError::UnknownChain(chain.clone()))?;
        let mut state = segment.state.lock();
        let broken_at = state
            .halted
            .ok_or_else(|| LedgerError::NotHalted(chain.clone()))?;

        state.halted = None;
        let payload = EntryPayload::ChainResumed {
            chain_id: chain.clone(),
            broken_at,
            reason: reason.to_string(),
        };
        match self.commit_locked(&segment, &mut state, payload, operator.clone()) {
            Ok(entry) => {
                Metrics::chain_resumed();
                warn!(chain = %chain, broken_at, operator = %operator, reason, "Chain resumed by operator");
                Ok(entry)
            }
            Err(e) => {
                state.halted = Some(broken_at);
                Err(e)
            }
        }
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn head(&self, scope: &str) -> Option<ChainHead> {
        let segment = self.segments.get(scope)?.last().map(Arc::clone)?;
        let state = segment.state.lock();
        Some(ChainHead {
            chain_id: segment.chain_id.clone(),
            sequence: state.last_sequence,
            hash: state.head,
            halted: state.halted.is_some(),
        })
    }

    pub fn current_chain(&self, scope: &str) -> Option<ChainId> {
        self.current_chain_of(scope)
    }

    #[must_use]
    pub fn is_halted(&self, chain: &ChainId) -> bool {
        self.segment(chain)
            .is_some_and(|s| s.state.lock().halted.is_some())
    }

    pub fn get(&self, id: &EntryId) -> LedgerResult<Option<LedgerEntry>> {
        self.store.get(id)
    }

    pub fn entries(
        &self,
        chain: &ChainId,
        range: impl RangeBounds<u64>,
    ) -> LedgerResult<Vec<LedgerEntry>> {
        let start = match range.start_bound() {
            Bound::Included(&n) => n,
            Bound::Excluded(&n) => n.saturating_add(1),
            Bound::Unbounded => 1,
        };
        let end = match range.end_bound() {
            Bound::Included(&n) => n,
            Bound::Excluded(&n) => n.saturating_sub(1),
            Bound::Unbounded => u64::MAX,
        };
        if start > end {
            return Ok(Vec::new());
        }
        self.store.range(chain, start..=end)
    }

    /// Entries of every epoch of `scope` matching `predicate`, oldest first.
    pub fn find<F>(&self, scope: &str, predicate: F) -> LedgerResult<Vec<LedgerEntry>>
    where
        F: Fn(&LedgerEntry) -> bool,
    {
        let mut found = Vec::new();
        for chain in self.chains()?.into_iter().filter(|c| c.scope == scope) {
            found.extend(
                self.store
                    .range(&chain, 1..=u64::MAX)?
                    .into_iter()
                    .filter(|e| predicate(e)),
            );
        }
        Ok(found)
    }

    pub fn chains(&self) -> LedgerResult<Vec<ChainId>> {
        self.store.chains()
    }
}

/// Walk `entries` expecting sequences `start..=end`; first failure wins.
fn scan(
    entries: &[LedgerEntry],
    start: u64,
    end: u64,
    prev: &mut Digest,
    checked: &mut usize,
) -> LedgerResult<Option<u64>> {
    let mut expected = start;
    for entry in entries {
        if entry.sequence() != expected {
            return Ok(Some(expected));
        }
        if entry.hash_prev() != prev {
            return Ok(Some(expected));
        }
        *checked += 1;
        if entry.recompute_hash()? != *entry.hash_self() {
            return Ok(Some(expected));
        }
        *prev = *entry.hash_self();
        expected += 1;
    }
    if expected <= end {
        return Ok(Some(expected));
    }
    Ok(None)
}
