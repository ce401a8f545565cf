//! Identity to role mapping.

use std::collections::HashMap;
use std::str::FromStr;

use alloy::primitives::Address;
use bastion_core::{SignerIdentity, SignerRole};

use crate::config::SignerConfig;
use crate::error::{AttestError, AttestResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisteredSigner {
    pub role: SignerRole,
    pub address: Address,
}

/// Each identity holds exactly one role.
#[derive(Debug, Clone, Default)]
pub struct SignerRegistry {
    signers: HashMap<SignerIdentity, RegisteredSigner>,
}

impl SignerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(signers: &[SignerConfig]) -> AttestResult<Self> {
        let mut registry = Self::new();
        for signer in signers {
            let address = Address::from_str(&signer.address)
                .map_err(|e| AttestError::InvalidAddress(format!("{}: {e}", signer.address)))?;
            registry.register(signer.identity.clone(), signer.role, address)?;
        }
        Ok(registry)
    }

    pub fn register(
        &mut self,
        identity: SignerIdentity,
        role: SignerRole,
        address: Address,
    ) -> AttestResult<()> {
        if self.signers.contains_key(&identity) {
            return Err(AttestError::DuplicateSigner(identity));
        }
        self.signers
            .insert(identity, RegisteredSigner { role, address });
        Ok(())
    }

    /// Remove an identity; its existing signatures stop verifying.
    pub fn revoke(&mut self, identity: &SignerIdentity) -> Option<RegisteredSigner> {
        self.signers.remove(identity)
    }

    pub fn lookup(&self, identity: &SignerIdentity) -> Option<RegisteredSigner> {
        self.signers.get(identity).copied()
    }

    pub fn len(&self) -> usize {
        self.signers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config_rejects_duplicates_and_bad_addresses() {
        let good = SignerConfig {
            identity: SignerIdentity::from("alice"),
            role: SignerRole::Owner,
            address: format!("0x{}", "11".repeat(20)),
        };
        let registry = SignerRegistry::from_config(std::slice::from_ref(&good)).unwrap();
        assert_eq!(
            registry.lookup(&SignerIdentity::from("alice")).map(|s| s.role),
            Some(SignerRole::Owner)
        );

        let dup = SignerConfig {
            role: SignerRole::Governance,
            ..good.clone()
        };
        assert!(matches!(
            SignerRegistry::from_config(&[good.clone(), dup]),
            Err(AttestError::DuplicateSigner(_))
        ));

        let bad = SignerConfig {
            address: "0xnope".to_string(),
            ..good
        };
        assert!(matches!(
            SignerRegistry::from_config(&[bad]),
            Err(AttestError::InvalidAddress(_))
        ));
    }
}
