//! EIP-712 attestation claim.

use alloy::primitives::{Address, PrimitiveSignature, B256};
use alloy::sol;
use alloy::sol_types::{eip712_domain, SolStruct};
use bastion_core::{Digest, SignerRole};
use bastion_ledger::LedgerEntry;

use crate::error::{AttestError, AttestResult};

pub const EIP712_DOMAIN_NAME: &str = "BastionAttestation";
pub const EIP712_DOMAIN_VERSION: &str = "1";
pub const EIP712_CHAIN_ID: u64 = 1;
pub const EIP712_VERIFYING_CONTRACT: Address = Address::ZERO;

sol! {
    #[derive(Debug)]
    struct AttestationClaim {
        bytes32 entryHash;
        bytes32 payloadHash;
        uint64 sequence;
        string author;
        string role;
    }
}

impl AttestationClaim {
    /// Claim over a committed entry for `role`.
    ///
    /// The entry's signer is not part of the chain hash; binding it here
    /// means a rewritten signer fails attestation re-verification.
    pub fn for_entry(entry: &LedgerEntry, role: SignerRole) -> AttestResult<Self> {
        Ok(Self {
            entryHash: B256::from(*entry.hash_self()),
            payloadHash: B256::from(entry.payload_hash()?),
            sequence: entry.sequence(),
            author: entry.signer().as_str().to_string(),
            role: role.as_str().to_string(),
        })
    }

    #[must_use]
    pub fn payload_digest(&self) -> Digest {
        Digest::from(self.payloadHash)
    }
}

/// `keccak256(0x1901 || domain_separator || struct_hash)`.
#[must_use]
pub fn claim_signing_hash(claim: &AttestationClaim) -> B256 {
    let domain = eip712_domain! {
        name: EIP712_DOMAIN_NAME,
        version: EIP712_DOMAIN_VERSION,
        chain_id: EIP712_CHAIN_ID,
        verifying_contract: EIP712_VERIFYING_CONTRACT,
    };
    claim.eip712_signing_hash(&domain)
}

/// Recover the address that produced `signature_hex` over `claim`.
pub fn recover_signer(claim: &AttestationClaim, signature_hex: &str) -> AttestResult<Address> {
    let bytes = hex::decode(signature_hex.trim_start_matches("0x"))
        .map_err(|e| AttestError::InvalidSignature(e.to_string()))?;
    let signature = PrimitiveSignature::try_from(bytes.as_slice())
        .map_err(|e| AttestError::InvalidSignature(e.to_string()))?;
    signature
        .recover_address_from_prehash(&claim_signing_hash(claim))
        .map_err(|e| AttestError::InvalidSignature(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::keccak256;
    use alloy::signers::local::PrivateKeySigner;
    use alloy::signers::Signer as _;
    use bastion_core::{LogEscalationSink, ManualClock, SignerIdentity};
    use bastion_ledger::{EntryPayload, Ledger, LedgerConfig, MemoryStore};
    use std::sync::Arc;

    fn claim(role: &str) -> AttestationClaim {
        AttestationClaim {
            entryHash: keccak256(b"entry"),
            payloadHash: keccak256(b"payload"),
            sequence: 7,
            author: "alice".to_string(),
            role: role.to_string(),
        }
    }

    #[test]
    fn test_claim_type_hash() {
        let expected = keccak256(
            b"AttestationClaim(bytes32 entryHash,bytes32 payloadHash,uint64 sequence,string author,string role)",
        );
        assert_eq!(claim("owner").eip712_type_hash(), expected);
    }

    #[test]
    fn test_role_is_bound_into_signing_hash() {
        assert_ne!(
            claim_signing_hash(&claim("owner")),
            claim_signing_hash(&claim("governance"))
        );
    }

    #[tokio::test]
    async fn test_entry_signer_is_bound_into_claim() {
        let append_as = |author: &str| {
            let ledger = Ledger::open(
                Arc::new(MemoryStore::new()),
                Arc::new(ManualClock::default()),
                Arc::new(LogEscalationSink),
                LedgerConfig::default(),
            )
            .unwrap();
            ledger
                .append(
                    "gate",
                    EntryPayload::Custom {
                        kind: "submission".to_string(),
                        body: serde_json::json!({ "n": 1 }),
                    },
                    SignerIdentity::from(author),
                )
                .unwrap()
        };
        let genuine = append_as("alice");
        let swapped = append_as("mallory");
        assert_eq!(genuine.hash_self(), swapped.hash_self());

        let signer = PrivateKeySigner::from_slice(&[1u8; 32]).unwrap();
        let claim = AttestationClaim::for_entry(&genuine, SignerRole::Owner).unwrap();
        let signature = signer.sign_hash(&claim_signing_hash(&claim)).await.unwrap();
        let sig_hex = hex::encode(signature.as_bytes());

        let forged = AttestationClaim::for_entry(&swapped, SignerRole::Owner).unwrap();
        assert_eq!(recover_signer(&claim, &sig_hex).unwrap(), signer.address());
        assert_ne!(recover_signer(&forged, &sig_hex).unwrap(), signer.address());
    }

    #[tokio::test]
    async fn test_sign_and_recover() {
        let signer = PrivateKeySigner::from_slice(&[1u8; 32]).unwrap();
        let claim = claim("owner");
        let signature = signer.sign_hash(&claim_signing_hash(&claim)).await.unwrap();
        let sig_hex = hex::encode(signature.as_bytes());

        assert_eq!(recover_signer(&claim, &sig_hex).unwrap(), signer.address());

        let other = AttestationClaim {
            sequence: 8,
            ..claim.clone()
        };
        assert_ne!(recover_signer(&other, &sig_hex).unwrap(), signer.address());
        assert!(recover_signer(&claim, "zz").is_err());
        assert!(recover_signer(&claim, "abcd").is_err());
    }
}
