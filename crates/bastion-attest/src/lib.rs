//! Multi-party attestation of ledger entries.
//!
//! An attestation is an EIP-712 secp256k1 signature over an
//! [`AttestationClaim`] binding the entry hash, the payload hash, the
//! sequence and the signer's role. Signatures are re-verified whenever
//! completeness is checked, never trusted from cache.

pub mod claim;
pub mod config;
pub mod error;
pub mod keys;
pub mod registry;
pub mod service;

pub use claim::{claim_signing_hash, recover_signer, AttestationClaim};
pub use config::{AttestationConfig, SignerConfig};
pub use error::{AttestError, AttestResult};
pub use keys::{KeyError, KeyManager, KeySource, KeySpec};
pub use registry::{RegisteredSigner, SignerRegistry};
pub use service::{Attestation, AttestationService, PendingAttestation, ATTESTATION_SCOPE};
