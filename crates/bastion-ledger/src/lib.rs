//! Append-only, hash-chained ledger.
//!
//! Every consequential action in bastion is recorded here:
//! - `LedgerEntry`: immutable, sequenced, hash-linked record
//! - `EntryPayload`: closed set of typed events the engines write
//! - `Ledger`: per-scope chains with epochs, CAS append, verification
//! - `LedgerStore`: storage adapters (`MemoryStore`, `JsonLinesStore`)
//!
//! # Hashing
//!
//! `hash_self = keccak256(msgpack(payload) || hash_prev || sequence_be)`.
//! Timestamps are not part of the hash input, so replaying the same appends
//! always reproduces the same chain of digests.

pub mod entry;
pub mod error;
pub mod jsonl;
pub mod ledger;
pub mod payload;
pub mod store;

pub use entry::{compute_hash, ChainId, EntryId, LedgerEntry};
pub use error::{LedgerError, LedgerResult};
pub use jsonl::JsonLinesStore;
pub use ledger::{ChainHead, ChainVerification, Ledger, LedgerConfig, AUDIT_SCOPE};
pub use payload::{ChangePathway, EntryPayload, PipelineEventKind};
pub use store::{LedgerStore, MemoryStore};
