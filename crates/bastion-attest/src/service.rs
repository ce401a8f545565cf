//! Attestation Service.
//!
//! A pending request names the roles that must sign an entry. Each signature
//! is recorded on the `attestation` chain; completeness is decided by
//! re-verifying every signature against the entry as it is stored now.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use alloy::signers::Signer as AlloySigner;
use bastion_core::{Clock, Digest, SignerIdentity, SignerRole};
use bastion_ledger::{EntryId, EntryPayload, Ledger, LedgerEntry};
use bastion_telemetry::Metrics;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::claim::{claim_signing_hash, recover_signer, AttestationClaim};
use crate::config::AttestationConfig;
use crate::error::{AttestError, AttestResult};
use crate::registry::SignerRegistry;

/// Scope of the chain recording signatures.
pub const ATTESTATION_SCOPE: &str = "attestation";

/// A verified signature over one entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Attestation {
    pub target: EntryId,
    pub signer: SignerIdentity,
    pub role: SignerRole,
    pub payload_hash: Digest,
    /// 65-byte recoverable signature, hex encoded.
    pub signature: String,
    pub verified_at: DateTime<Utc>,
    pub verifier: String,
    /// Where the signature was recorded.
    pub record: EntryId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingAttestation {
    pub target: EntryId,
    pub required_roles: BTreeSet<SignerRole>,
    pub attestations: Vec<Attestation>,
    pub requested_at: DateTime<Utc>,
}

impl PendingAttestation {
    /// Roles with no signature yet. Does not re-verify.
    #[must_use]
    pub fn unsigned_roles(&self) -> Vec<SignerRole> {
        self.required_roles
            .iter()
            .filter(|role| !self.attestations.iter().any(|a| a.role == **role))
            .copied()
            .collect()
    }
}

pub struct AttestationService {
    ledger: Arc<Ledger>,
    registry: RwLock<SignerRegistry>,
    clock: Arc<dyn Clock>,
    pending: DashMap<EntryId, PendingAttestation>,
    sign_timeout: Duration,
    verifier: String,
}

impl AttestationService {
    pub fn new(
        ledger: Arc<Ledger>,
        registry: SignerRegistry,
        clock: Arc<dyn Clock>,
        config: &AttestationConfig,
    ) -> Self {
        Self {
            ledger,
            registry: RwLock::new(registry),
            clock,
            pending: DashMap::new(),
            sign_timeout: Duration::from_millis(config.sign_timeout_ms),
            verifier: "bastion-attest".to_string(),
        }
    }

    pub fn registry(&self) -> &RwLock<SignerRegistry> {
        &self.registry
    }

    /// Open a request for `required_roles` to sign `entry_id`.
    pub fn request_attestation(
        &self,
        entry_id: &EntryId,
        required_roles: &[SignerRole],
    ) -> AttestResult<PendingAttestation> {
        if required_roles.is_empty() {
            return Err(AttestError::EmptyRoleSet(entry_id.clone()));
        }
        if self.ledger.get(entry_id)?.is_none() {
            return Err(AttestError::EntryNotFound(entry_id.clone()));
        }

        let pending = PendingAttestation {
            target: entry_id.clone(),
            required_roles: required_roles.iter().copied().collect(),
            attestations: Vec::new(),
            requested_at: self.clock.now(),
        };
        match self.pending.entry(entry_id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(AttestError::AlreadyRequested(entry_id.clone())),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(pending.clone());
                debug!(entry = %entry_id, roles = ?pending.required_roles, "Attestation requested");
                Ok(pending)
            }
        }
    }

    pub fn pending(&self, entry_id: &EntryId) -> Option<PendingAttestation> {
        self.pending.get(entry_id).map(|p| p.clone())
    }

    /// Sign `entry_id` as `identity` using the configured deadline.
    pub async fn sign<S>(
        &self,
        entry_id: &EntryId,
        identity: &SignerIdentity,
        signer: &S,
    ) -> AttestResult<Attestation>
    where
        S: AlloySigner + Send + Sync,
    {
        self.sign_with_deadline(entry_id, identity, signer, self.sign_timeout)
            .await
    }

    /// Sign with an explicit deadline. On timeout nothing is recorded.
    pub async fn sign_with_deadline<S>(
        &self,
        entry_id: &EntryId,
        identity: &SignerIdentity,
        signer: &S,
        deadline: Duration,
    ) -> AttestResult<Attestation>
    where
        S: AlloySigner + Send + Sync,
    {
        let result = self.sign_inner(entry_id, identity, signer, deadline).await;
        if let Err(e) = &result {
            let outcome = match e {
                AttestError::Timeout { .. } => "timeout",
                _ => "rejected",
            };
            let role = self
                .registry
                .read()
                .lookup(identity)
                .map_or("unknown", |s| s.role.as_str());
            Metrics::attestation(role, outcome);
            warn!(entry = %entry_id, identity = %identity, error = %e, "Attestation rejected");
        }
        result
    }

    async fn sign_inner<S>(
        &self,
        entry_id: &EntryId,
        identity: &SignerIdentity,
        signer: &S,
        deadline: Duration,
    ) -> AttestResult<Attestation>
    where
        S: AlloySigner + Send + Sync,
    {
        let registered = self.registry.read().lookup(identity).ok_or_else(|| {
            AttestError::UnauthorizedSigner {
                identity: identity.clone(),
                reason: "identity not registered".to_string(),
            }
        })?;
        {
            let pending = self
                .pending
                .get(entry_id)
                .ok_or_else(|| AttestError::NoPendingRequest(entry_id.clone()))?;
            check_can_sign(&pending, identity, registered.role)?;
        }
        if signer.address() != registered.address {
            return Err(AttestError::UnauthorizedSigner {
                identity: identity.clone(),
                reason: format!(
                    "key derives {} but identity is registered as {}",
                    signer.address(),
                    registered.address
                ),
            });
        }

        let entry = self.load_entry(entry_id)?;
        let claim = AttestationClaim::for_entry(&entry, registered.role)?;
        let hash = claim_signing_hash(&claim);

        let signature = tokio::time::timeout(deadline, signer.sign_hash(&hash))
            .await
            .map_err(|_| AttestError::Timeout {
                entry_id: entry_id.clone(),
                timeout_ms: deadline.as_millis() as u64,
            })??;
        let signature = hex::encode(signature.as_bytes());

        if recover_signer(&claim, &signature)? != registered.address {
            return Err(AttestError::InvalidSignature(
                "signature does not recover to the registered address".to_string(),
            ));
        }

        // The pending guard is held across the record append so concurrent
        // signers for the same entry are checked against each other.
        let mut pending = self
            .pending
            .get_mut(entry_id)
            .ok_or_else(|| AttestError::NoPendingRequest(entry_id.clone()))?;
        check_can_sign(&pending, identity, registered.role)?;

        let record = self.ledger.append(
            ATTESTATION_SCOPE,
            EntryPayload::AttestationRecorded {
                target: entry_id.clone(),
                signer: identity.clone(),
                role: registered.role,
                payload_hash: claim.payload_digest(),
                signature: signature.clone(),
            },
            identity.clone(),
        )?;

        let attestation = Attestation {
            target: entry_id.clone(),
            signer: identity.clone(),
            role: registered.role,
            payload_hash: claim.payload_digest(),
            signature,
            verified_at: self.clock.now(),
            verifier: self.verifier.clone(),
            record: record.id(),
        };
        pending.attestations.push(attestation.clone());

        Metrics::attestation(registered.role.as_str(), "signed");
        info!(
            entry = %entry_id,
            identity = %identity,
            role = %registered.role,
            "Attestation recorded"
        );
        Ok(attestation)
    }

    /// True when every required role has a signature that verifies now.
    pub fn is_fully_attested(&self, entry_id: &EntryId) -> AttestResult<bool> {
        Ok(self.missing_roles(entry_id)?.is_empty())
    }

    /// Required roles lacking a currently valid signature.
    pub fn missing_roles(&self, entry_id: &EntryId) -> AttestResult<Vec<SignerRole>> {
        let pending = self
            .pending(entry_id)
            .ok_or_else(|| AttestError::NoPendingRequest(entry_id.clone()))?;
        let entry = self.load_entry(entry_id)?;
        let registry = self.registry.read();

        let mut missing = Vec::new();
        for role in &pending.required_roles {
            let claim = AttestationClaim::for_entry(&entry, *role)?;
            let verified = pending.attestations.iter().any(|a| {
                a.role == *role
                    && registry
                        .lookup(&a.signer)
                        .filter(|s| s.role == *role)
                        .is_some_and(|s| {
                            recover_signer(&claim, &a.signature).is_ok_and(|addr| addr == s.address)
                        })
            });
            if !verified {
                missing.push(*role);
            }
        }
        Ok(missing)
    }

    /// Drop the request for `entry_id` once its outcome is committed or
    /// superseded. The `AttestationRecorded` entries stay on the ledger.
    pub fn release(&self, entry_id: &EntryId) -> Option<PendingAttestation> {
        let released = self.pending.remove(entry_id).map(|(_, pending)| pending);
        if let Some(pending) = &released {
            debug!(
                entry = %entry_id,
                signatures = pending.attestations.len(),
                "Attestation request released"
            );
        }
        released
    }

    pub fn attestations(&self, entry_id: &EntryId) -> Vec<Attestation> {
        self.pending
            .get(entry_id)
            .map(|p| p.attestations.clone())
            .unwrap_or_default()
    }

    fn load_entry(&self, entry_id: &EntryId) -> AttestResult<LedgerEntry> {
        self.ledger
            .get(entry_id)?
            .ok_or_else(|| AttestError::EntryNotFound(entry_id.clone()))
    }
}

fn check_can_sign(
    pending: &PendingAttestation,
    identity: &SignerIdentity,
    role: SignerRole,
) -> AttestResult<()> {
    if !pending.required_roles.contains(&role) {
        return Err(AttestError::UnauthorizedSigner {
            identity: identity.clone(),
            reason: format!(
                "role {role} not required (required: {:?})",
                pending.required_roles
            ),
        });
    }
    if pending.attestations.iter().any(|a| &a.signer == identity) {
        return Err(AttestError::AlreadySigned {
            entry_id: pending.target.clone(),
            identity: identity.clone(),
        });
    }
    if pending.attestations.iter().any(|a| a.role == role) {
        return Err(AttestError::RoleAlreadyAttested {
            entry_id: pending.target.clone(),
            role,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{Address, PrimitiveSignature, B256};
    use alloy::signers::local::PrivateKeySigner;
    use alloy::signers::{Signer, SignerSync};
    use slow_signer::SlowSigner;
    use bastion_core::{LogEscalationSink, ManualClock};
    use bastion_ledger::{LedgerConfig, MemoryStore};

    struct Fixture {
        service: AttestationService,
        ledger: Arc<Ledger>,
        keys: Vec<(SignerIdentity, PrivateKeySigner)>,
    }

    /// alice=owner, bob=governance, carol=technical, dave=risk, erin=operations.
    fn fixture() -> Fixture {
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::default());
        let ledger = Arc::new(
            Ledger::open(
                Arc::new(MemoryStore::new()),
                Arc::clone(&clock),
                Arc::new(LogEscalationSink),
                LedgerConfig::default(),
            )
            .unwrap(),
        );
        let mut registry = SignerRegistry::new();
        let mut keys = Vec::new();
        for (i, (name, role)) in [
            ("alice", SignerRole::Owner),
            ("bob", SignerRole::Governance),
            ("carol", SignerRole::Technical),
            ("dave", SignerRole::Risk),
            ("erin", SignerRole::Operations),
        ]
        .into_iter()
        .enumerate()
        {
            let key = PrivateKeySigner::from_slice(&[i as u8 + 1; 32]).unwrap();
            registry
                .register(SignerIdentity::from(name), role, key.address())
                .unwrap();
            keys.push((SignerIdentity::from(name), key));
        }
        let service =
            AttestationService::new(Arc::clone(&ledger), registry, clock, &AttestationConfig::default());
        Fixture {
            service,
            ledger,
            keys,
        }
    }

    impl Fixture {
        fn key(&self, name: &str) -> (SignerIdentity, PrivateKeySigner) {
            self.keys
                .iter()
                .find(|(id, _)| id.as_str() == name)
                .cloned()
                .unwrap()
        }

        fn target(&self) -> EntryId {
            self.ledger
                .append(
                    "gate",
                    EntryPayload::Custom {
                        kind: "submission".to_string(),
                        body: serde_json::json!({ "n": 1 }),
                    },
                    SignerIdentity::from("alice"),
                )
                .unwrap()
                .id()
        }
    }

    #[tokio::test]
    async fn test_dual_signoff_completes() {
        let fx = fixture();
        let target = fx.target();
        fx.service
            .request_attestation(&target, &[SignerRole::Owner, SignerRole::Governance])
            .unwrap();
        assert!(!fx.service.is_fully_attested(&target).unwrap());

        let (alice, alice_key) = fx.key("alice");
        fx.service.sign(&target, &alice, &alice_key).await.unwrap();
        assert_eq!(
            fx.service.missing_roles(&target).unwrap(),
            vec![SignerRole::Governance]
        );

        let (bob, bob_key) = fx.key("bob");
        let attestation = fx.service.sign(&target, &bob, &bob_key).await.unwrap();
        assert_eq!(attestation.role, SignerRole::Governance);
        assert!(fx.service.is_fully_attested(&target).unwrap());

        let released = fx.service.release(&target).unwrap();
        assert_eq!(released.attestations.len(), 2);
        assert!(fx.service.pending(&target).is_none());
        assert!(fx.service.release(&target).is_none());
        assert!(matches!(
            fx.service.is_fully_attested(&target),
            Err(AttestError::NoPendingRequest(_))
        ));

        let records = fx
            .ledger
            .find(ATTESTATION_SCOPE, |e| {
                matches!(e.payload(), EntryPayload::AttestationRecorded { .. })
            })
            .unwrap();
        assert_eq!(records.len(), 2);
    }

    #[tokio::test]
    async fn test_duplicate_and_unrequired_signers_rejected() {
        let fx = fixture();
        let target = fx.target();
        fx.service
            .request_attestation(&target, &[SignerRole::Owner, SignerRole::Governance])
            .unwrap();

        let (alice, alice_key) = fx.key("alice");
        fx.service.sign(&target, &alice, &alice_key).await.unwrap();
        let err = fx.service.sign(&target, &alice, &alice_key).await.unwrap_err();
        assert!(matches!(err, AttestError::AlreadySigned { .. }));

        let (carol, carol_key) = fx.key("carol");
        let err = fx.service.sign(&target, &carol, &carol_key).await.unwrap_err();
        assert!(matches!(err, AttestError::UnauthorizedSigner { .. }));

        let stranger = SignerIdentity::from("mallory");
        let err = fx.service.sign(&target, &stranger, &alice_key).await.unwrap_err();
        assert!(matches!(err, AttestError::UnauthorizedSigner { .. }));
    }

    #[tokio::test]
    async fn test_key_must_derive_registered_identity() {
        let fx = fixture();
        let target = fx.target();
        fx.service
            .request_attestation(&target, &[SignerRole::Governance])
            .unwrap();

        let (bob, _) = fx.key("bob");
        let (_, alice_key) = fx.key("alice");
        let err = fx.service.sign(&target, &bob, &alice_key).await.unwrap_err();
        assert!(matches!(err, AttestError::UnauthorizedSigner { .. }));
        assert!(fx.service.attestations(&target).is_empty());
    }

    #[tokio::test]
    async fn test_second_signer_of_same_role_rejected() {
        let fx = fixture();
        let target = fx.target();
        let extra = PrivateKeySigner::from_slice(&[42u8; 32]).unwrap();
        fx.service
            .registry()
            .write()
            .register(SignerIdentity::from("frank"), SignerRole::Owner, extra.address())
            .unwrap();
        fx.service
            .request_attestation(&target, &[SignerRole::Owner, SignerRole::Risk])
            .unwrap();

        let (alice, alice_key) = fx.key("alice");
        fx.service.sign(&target, &alice, &alice_key).await.unwrap();
        let err = fx
            .service
            .sign(&target, &SignerIdentity::from("frank"), &extra)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AttestError::RoleAlreadyAttested {
                role: SignerRole::Owner,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_no_pending_request() {
        let fx = fixture();
        let target = fx.target();
        let (alice, alice_key) = fx.key("alice");
        let err = fx.service.sign(&target, &alice, &alice_key).await.unwrap_err();
        assert!(matches!(err, AttestError::NoPendingRequest(_)));
        assert!(matches!(
            fx.service.request_attestation(&target, &[]),
            Err(AttestError::EmptyRoleSet(_))
        ));
    }

    #[tokio::test]
    async fn test_revoked_signer_no_longer_counts() {
        let fx = fixture();
        let target = fx.target();
        fx.service
            .request_attestation(&target, &[SignerRole::Owner])
            .unwrap();
        let (alice, alice_key) = fx.key("alice");
        fx.service.sign(&target, &alice, &alice_key).await.unwrap();
        assert!(fx.service.is_fully_attested(&target).unwrap());

        fx.service.registry().write().revoke(&alice);
        assert!(!fx.service.is_fully_attested(&target).unwrap());
    }

    #[tokio::test]
    async fn test_timeout_records_nothing() {
        let fx = fixture();
        let target = fx.target();
        fx.service
            .request_attestation(&target, &[SignerRole::Owner])
            .unwrap();
        let (alice, alice_key) = fx.key("alice");
        let slow = SlowSigner::new(alice_key, Duration::from_secs(60));

        let err = fx
            .service
            .sign_with_deadline(&target, &alice, &slow, Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, AttestError::Timeout { .. }));
        assert!(fx.service.attestations(&target).is_empty());
        assert!(fx.ledger.head(ATTESTATION_SCOPE).is_none());
    }

    mod slow_signer {
        use super::*;
        use alloy::primitives::ChainId;

        /// Wraps a key and sleeps before signing.
        pub struct SlowSigner {
            inner: PrivateKeySigner,
            delay: Duration,
        }

        impl SlowSigner {
            pub fn new(inner: PrivateKeySigner, delay: Duration) -> Self {
                Self { inner, delay }
            }
        }

        #[async_trait::async_trait]
        impl Signer for SlowSigner {
            async fn sign_hash(&self, hash: &B256) -> alloy::signers::Result<PrimitiveSignature> {
                tokio::time::sleep(self.delay).await;
                self.inner.sign_hash_sync(hash)
            }

            fn address(&self) -> Address {
                self.inner.address()
            }

            fn chain_id(&self) -> Option<ChainId> {
                None
            }

            fn set_chain_id(&mut self, _chain_id: Option<ChainId>) {}
        }
    }
}
