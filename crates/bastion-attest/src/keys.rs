//! Attestor key loading.
//!
//! Security notes:
//! - Secret bytes only live in `Zeroizing` buffers until the signer is built.
//! - Keys are loaded once at startup; no runtime key rotation.
//! - Never log private key material.

use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;

use alloy::primitives::Address;
use alloy::signers::local::PrivateKeySigner;
use bastion_core::SignerIdentity;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;
use zeroize::Zeroizing;

/// Source of a private key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum KeySource {
    /// Load from environment variable (development).
    EnvVar { var_name: String },
    /// Load from file (production, recommend 0600 permissions).
    File { path: PathBuf },
}

/// One locally held attestor key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySpec {
    pub identity: SignerIdentity,
    pub source: KeySource,
    /// If set, the derived address must match.
    #[serde(default)]
    pub expected_address: Option<String>,
}

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),

    #[error("Failed to decode hex: {0}")]
    HexDecode(#[from] hex::FromHexError),

    #[error("Invalid private key: {0}")]
    InvalidKey(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Address mismatch for {identity}: expected {expected}, got {actual}")]
    AddressMismatch {
        identity: SignerIdentity,
        expected: Address,
        actual: Address,
    },

    #[error("Duplicate key for {0}")]
    DuplicateIdentity(SignerIdentity),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Holds the attestor keys this process may sign with.
#[derive(Default)]
pub struct KeyManager {
    signers: HashMap<SignerIdentity, PrivateKeySigner>,
}

impl KeyManager {
    /// Load every key in `specs`, verifying expected addresses.
    pub fn load(specs: &[KeySpec]) -> Result<Self, KeyError> {
        let mut manager = Self::default();
        for spec in specs {
            let secret = read_secret(&spec.source)?;
            let expected = spec
                .expected_address
                .as_deref()
                .map(|s| Address::from_str(s).map_err(|e| KeyError::InvalidAddress(e.to_string())))
                .transpose()?;
            manager.insert(spec.identity.clone(), &secret, expected)?;
        }
        if !manager.signers.is_empty() {
            info!(keys = manager.signers.len(), "Attestor keys loaded");
        }
        Ok(manager)
    }

    /// Add a key from raw bytes.
    pub fn insert(
        &mut self,
        identity: SignerIdentity,
        secret_bytes: &[u8],
        expected_address: Option<Address>,
    ) -> Result<Address, KeyError> {
        if self.signers.contains_key(&identity) {
            return Err(KeyError::DuplicateIdentity(identity));
        }
        let signer = PrivateKeySigner::from_slice(secret_bytes)
            .map_err(|e| KeyError::InvalidKey(e.to_string()))?;
        if let Some(expected) = expected_address {
            if signer.address() != expected {
                return Err(KeyError::AddressMismatch {
                    identity,
                    expected,
                    actual: signer.address(),
                });
            }
        }
        let address = signer.address();
        self.signers.insert(identity, signer);
        Ok(address)
    }

    pub fn signer(&self, identity: &SignerIdentity) -> Option<&PrivateKeySigner> {
        self.signers.get(identity)
    }

    pub fn address(&self, identity: &SignerIdentity) -> Option<Address> {
        self.signers.get(identity).map(PrivateKeySigner::address)
    }

    pub fn identities(&self) -> impl Iterator<Item = &SignerIdentity> {
        self.signers.keys()
    }
}

/// Parse a hex key (optional 0x prefix, surrounding whitespace trimmed).
fn parse_hex_key(hex_str: &str) -> Result<Zeroizing<Vec<u8>>, KeyError> {
    let trimmed = hex_str.trim().trim_start_matches("0x");
    Ok(Zeroizing::new(hex::decode(trimmed)?))
}

fn read_secret(source: &KeySource) -> Result<Zeroizing<Vec<u8>>, KeyError> {
    match source {
        KeySource::EnvVar { var_name } => {
            let value = Zeroizing::new(
                std::env::var(var_name).map_err(|_| KeyError::EnvVarNotFound(var_name.clone()))?,
            );
            parse_hex_key(&value)
        }
        KeySource::File { path } => {
            let content = Zeroizing::new(std::fs::read_to_string(path)?);
            parse_hex_key(&content)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_insert_and_lookup() {
        let mut manager = KeyManager::default();
        let identity = SignerIdentity::from("ops-bot");
        let address = manager.insert(identity.clone(), &[3u8; 32], None).unwrap();
        assert_eq!(manager.address(&identity), Some(address));
        assert!(manager.signer(&SignerIdentity::from("nobody")).is_none());

        let err = manager.insert(identity, &[4u8; 32], None).unwrap_err();
        assert!(matches!(err, KeyError::DuplicateIdentity(_)));
    }

    #[test]
    fn test_address_mismatch() {
        let mut manager = KeyManager::default();
        let result = manager.insert(SignerIdentity::from("x"), &[3u8; 32], Some(Address::ZERO));
        assert!(matches!(result, Err(KeyError::AddressMismatch { .. })));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "0x{}", hex::encode([5u8; 32])).unwrap();

        let expected = PrivateKeySigner::from_slice(&[5u8; 32]).unwrap().address();
        let spec = KeySpec {
            identity: SignerIdentity::from("risk-bot"),
            source: KeySource::File {
                path: file.path().to_path_buf(),
            },
            expected_address: Some(expected.to_string()),
        };
        let manager = KeyManager::load(&[spec]).unwrap();
        assert_eq!(manager.address(&SignerIdentity::from("risk-bot")), Some(expected));
    }

    #[test]
    fn test_missing_env_var() {
        let spec = KeySpec {
            identity: SignerIdentity::from("x"),
            source: KeySource::EnvVar {
                var_name: "BASTION_TEST_KEY_THAT_DOES_NOT_EXIST".to_string(),
            },
            expected_address: None,
        };
        assert!(matches!(
            KeyManager::load(&[spec]),
            Err(KeyError::EnvVarNotFound(_))
        ));
    }
}
