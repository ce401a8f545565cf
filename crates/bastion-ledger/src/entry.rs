//! Ledger entry and chain identifiers.

use std::fmt;

use bastion_core::{Digest, SignerIdentity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, LedgerResult};
use crate::payload::EntryPayload;

/// One epoch of a scope's chain.
///
/// Scopes are `[A-Za-z0-9_-]+` so they can double as file stems.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChainId {
    pub scope: String,
    pub epoch: u32,
}

impl ChainId {
    pub fn new(scope: impl Into<String>, epoch: u32) -> LedgerResult<Self> {
        let scope = scope.into();
        validate_scope(&scope)?;
        Ok(Self { scope, epoch })
    }

    /// First epoch of a scope.
    pub fn initial(scope: impl Into<String>) -> LedgerResult<Self> {
        Self::new(scope, 0)
    }

    #[must_use]
    pub fn next_epoch(&self) -> Self {
        Self {
            scope: self.scope.clone(),
            epoch: self.epoch + 1,
        }
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.scope, self.epoch)
    }
}

pub(crate) fn validate_scope(scope: &str) -> LedgerResult<()> {
    let valid = !scope.is_empty()
        && scope
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-');
    if valid {
        Ok(())
    } else {
        Err(LedgerError::InvalidScope(scope.to_string()))
    }
}

/// Address of a committed entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntryId {
    pub chain: ChainId,
    pub sequence: u64,
}

impl EntryId {
    #[must_use]
    pub fn new(chain: ChainId, sequence: u64) -> Self {
        Self { chain, sequence }
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.chain, self.sequence)
    }
}

/// Canonical bytes of a payload (named-field MessagePack).
pub fn canonical_payload(payload: &EntryPayload) -> LedgerResult<Vec<u8>> {
    rmp_serde::to_vec_named(payload).map_err(|e| LedgerError::Serialization(e.to_string()))
}

/// `keccak256(canonical(payload) || hash_prev || sequence_be)`.
pub fn compute_hash(payload: &EntryPayload, hash_prev: &Digest, sequence: u64) -> LedgerResult<Digest> {
    let mut data = canonical_payload(payload)?;
    data.extend_from_slice(hash_prev.as_bytes());
    data.extend_from_slice(&sequence.to_be_bytes());
    Ok(Digest::keccak(&data))
}

/// Immutable, hash-linked record.
///
/// Fields are private: a committed entry is only ever read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    chain_id: ChainId,
    sequence: u64,
    hash_prev: Digest,
    hash_self: Digest,
    payload: EntryPayload,
    signer: SignerIdentity,
    timestamp: DateTime<Utc>,
}

impl LedgerEntry {
    /// Seal a new entry, computing `hash_self`.
    pub(crate) fn seal(
        chain_id: ChainId,
        sequence: u64,
        hash_prev: Digest,
        payload: EntryPayload,
        signer: SignerIdentity,
        timestamp: DateTime<Utc>,
    ) -> LedgerResult<Self> {
        let hash_self = compute_hash(&payload, &hash_prev, sequence)?;
        Ok(Self {
            chain_id,
            sequence,
            hash_prev,
            hash_self,
            payload,
            signer,
            timestamp,
        })
    }

    pub fn chain_id(&self) -> &ChainId {
        &self.chain_id
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn hash_prev(&self) -> &Digest {
        &self.hash_prev
    }

    pub fn hash_self(&self) -> &Digest {
        &self.hash_self
    }

    pub fn payload(&self) -> &EntryPayload {
        &self.payload
    }

    pub fn signer(&self) -> &SignerIdentity {
        &self.signer
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    #[must_use]
    pub fn id(&self) -> EntryId {
        EntryId::new(self.chain_id.clone(), self.sequence)
    }

    /// Hash recomputed from the stored fields.
    pub fn recompute_hash(&self) -> LedgerResult<Digest> {
        compute_hash(&self.payload, &self.hash_prev, self.sequence)
    }

    /// Keccak-256 of the canonical payload alone; attestations sign over it.
    pub fn payload_hash(&self) -> LedgerResult<Digest> {
        Ok(Digest::keccak(&canonical_payload(&self.payload)?))
    }

    #[cfg(test)]
    pub(crate) fn with_hash_self(mut self, hash_self: Digest) -> Self {
        self.hash_self = hash_self;
        self
    }

    #[cfg(test)]
    pub(crate) fn with_payload(mut self, payload: EntryPayload) -> Self {
        self.payload = payload;
        self
    }
}
