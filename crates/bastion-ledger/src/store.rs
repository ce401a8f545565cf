//! Storage adapters for committed entries.

use std::collections::BTreeMap;
use std::ops::RangeInclusive;

use parking_lot::RwLock;

use crate::entry::{ChainId, EntryId, LedgerEntry};
use crate::error::{LedgerError, LedgerResult};

/// Append-only entry storage.
///
/// Adapters must refuse to write a sequence twice. The ledger serializes
/// appends per chain, so `insert` only sees the next sequence under normal
/// operation; anything else is a bug or tampering and is rejected.
pub trait LedgerStore: Send + Sync {
    fn insert(&self, entry: LedgerEntry) -> LedgerResult<()>;

    fn get(&self, id: &EntryId) -> LedgerResult<Option<LedgerEntry>>;

    /// Entries with sequence in `range`, ascending. Missing sequences are
    /// simply absent from the result.
    fn range(&self, chain: &ChainId, range: RangeInclusive<u64>) -> LedgerResult<Vec<LedgerEntry>>;

    fn last(&self, chain: &ChainId) -> LedgerResult<Option<LedgerEntry>>;

    /// All known chains, ordered by scope then epoch.
    fn chains(&self) -> LedgerResult<Vec<ChainId>>;
}

/// Check that `entry` directly follows the last stored sequence.
pub(crate) fn check_next_sequence(last: Option<u64>, entry: &LedgerEntry) -> LedgerResult<()> {
    let expected = last.unwrap_or(0) + 1;
    let actual = entry.sequence();
    if actual < expected {
        return Err(LedgerError::ImmutableViolation {
            entry_id: entry.id(),
            attempt: "overwrite".to_string(),
        });
    }
    if actual > expected {
        return Err(LedgerError::SequenceGap {
            chain_id: entry.chain_id().clone(),
            expected,
            actual,
        });
    }
    Ok(())
}

/// In-process store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    chains: RwLock<BTreeMap<ChainId, Vec<LedgerEntry>>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load an entry replayed from durable storage without the sequence
    /// check, so gaps and tampering surface in verification instead.
    pub(crate) fn load_replayed(&self, entry: LedgerEntry) {
        self.chains
            .write()
            .entry(entry.chain_id().clone())
            .or_default()
            .push(entry);
    }

    /// Replace a stored entry in place, bypassing every guard.
    #[cfg(test)]
    pub(crate) fn tamper(&self, id: &EntryId, f: impl FnOnce(LedgerEntry) -> LedgerEntry) {
        let mut chains = self.chains.write();
        if let Some(entries) = chains.get_mut(&id.chain) {
            if let Some(slot) = entries.iter_mut().find(|e| e.sequence() == id.sequence) {
                *slot = f(slot.clone());
            }
        }
    }

    /// Drop a stored entry, bypassing every guard.
    #[cfg(test)]
    pub(crate) fn tamper_remove(&self, id: &EntryId) {
        let mut chains = self.chains.write();
        if let Some(entries) = chains.get_mut(&id.chain) {
            entries.retain(|e| e.sequence() != id.sequence);
        }
    }
}

impl LedgerStore for MemoryStore {
    fn insert(&self, entry: LedgerEntry) -> LedgerResult<()> {
        let mut chains = self.chains.write();
        let entries = chains.entry(entry.chain_id().clone()).or_default();
        check_next_sequence(entries.last().map(LedgerEntry::sequence), &entry)?;
        entries.push(entry);
        Ok(())
    }

    fn get(&self, id: &EntryId) -> LedgerResult<Option<LedgerEntry>> {
        let chains = self.chains.read();
        Ok(chains
            .get(&id.chain)
            .and_then(|entries| entries.iter().find(|e| e.sequence() == id.sequence))
            .cloned())
    }

    fn range(&self, chain: &ChainId, range: RangeInclusive<u64>) -> LedgerResult<Vec<LedgerEntry>> {
        let chains = self.chains.read();
        Ok(chains
            .get(chain)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|e| range.contains(&e.sequence()))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn last(&self, chain: &ChainId) -> LedgerResult<Option<LedgerEntry>> {
        let chains = self.chains.read();
        Ok(chains.get(chain).and_then(|entries| entries.last()).cloned())
    }

    fn chains(&self) -> LedgerResult<Vec<ChainId>> {
        Ok(self.chains.read().keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::EntryPayload;
    use bastion_core::{Digest, SignerIdentity};
    use chrono::Utc;

    fn entry(chain: &ChainId, sequence: u64, prev: Digest) -> LedgerEntry {
        LedgerEntry::seal(
            chain.clone(),
            sequence,
            prev,
            EntryPayload::Custom {
                kind: "note".to_string(),
                body: serde_json::json!(sequence),
            },
            SignerIdentity::from("alice"),
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn test_insert_and_query() {
        let store = MemoryStore::new();
        let chain = ChainId::initial("gate").unwrap();
        let first = entry(&chain, 1, Digest::GENESIS);
        let second = entry(&chain, 2, *first.hash_self());
        store.insert(first.clone()).unwrap();
        store.insert(second.clone()).unwrap();

        assert_eq!(store.get(&first.id()).unwrap(), Some(first));
        assert_eq!(store.last(&chain).unwrap(), Some(second));
        assert_eq!(store.range(&chain, 2..=10).unwrap().len(), 1);
        assert_eq!(store.chains().unwrap(), vec![chain]);
    }

    #[test]
    fn test_sequence_written_twice_rejected() {
        let store = MemoryStore::new();
        let chain = ChainId::initial("gate").unwrap();
        store.insert(entry(&chain, 1, Digest::GENESIS)).unwrap();

        let err = store.insert(entry(&chain, 1, Digest::GENESIS)).unwrap_err();
        assert!(matches!(err, LedgerError::ImmutableViolation { .. }));

        let err = store.insert(entry(&chain, 3, Digest::GENESIS)).unwrap_err();
        assert!(matches!(
            err,
            LedgerError::SequenceGap {
                expected: 2,
                actual: 3,
                ..
            }
        ));
    }
}
