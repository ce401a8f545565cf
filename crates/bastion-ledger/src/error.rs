//! Ledger error types.

use bastion_core::Digest;
use thiserror::Error;

use crate::entry::{ChainId, EntryId};

#[derive(Debug, Error)]
pub enum LedgerError {
    /// Caller's `hash_prev` is not the chain head (stale writer).
    #[error("Chain head mismatch on {chain_id}: expected {expected}, actual head {actual}")]
    HeadMismatch {
        chain_id: ChainId,
        expected: Digest,
        actual: Digest,
    },

    /// Verification found a broken link; the chain is halted.
    #[error("Chain {chain_id} broken at sequence {broken_at}; writes halted pending investigation")]
    ChainBroken { chain_id: ChainId, broken_at: u64 },

    #[error("Immutable violation: attempted {attempt} of committed entry {entry_id}")]
    ImmutableViolation { entry_id: EntryId, attempt: String },

    #[error("Sequence gap on {chain_id}: expected {expected}, got {actual}")]
    SequenceGap {
        chain_id: ChainId,
        expected: u64,
        actual: u64,
    },

    #[error("Append to scope {scope} failed after {attempts} attempts")]
    RetriesExhausted { scope: String, attempts: u32 },

    #[error("Chain epoch {chain_id} is retired; current epoch is {current}")]
    EpochRetired { chain_id: ChainId, current: ChainId },

    #[error("Chain {0} is not halted")]
    NotHalted(ChainId),

    #[error("Unknown chain: {0}")]
    UnknownChain(ChainId),

    #[error("Invalid scope: {0}")]
    InvalidScope(String),

    #[error("Payload serialization failed: {0}")]
    Serialization(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl LedgerError {
    /// Hard halts are reported for human intervention, never retried.
    #[must_use]
    pub fn is_human_intervention_required(&self) -> bool {
        matches!(self, Self::ChainBroken { .. })
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;
