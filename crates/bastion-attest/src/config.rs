use bastion_core::{SignerIdentity, SignerRole};
use serde::{Deserialize, Serialize};

use crate::keys::KeySpec;

fn default_sign_timeout_ms() -> u64 {
    5_000
}

/// A registered attestor: identity, its single role, and its address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignerConfig {
    pub identity: SignerIdentity,
    pub role: SignerRole,
    /// 0x-prefixed hex address.
    pub address: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttestationConfig {
    /// Deadline for producing a signature.
    #[serde(default = "default_sign_timeout_ms")]
    pub sign_timeout_ms: u64,

    #[serde(default)]
    pub signers: Vec<SignerConfig>,

    /// Keys held by this process (automated attestors).
    #[serde(default)]
    pub keys: Vec<KeySpec>,
}

impl Default for AttestationConfig {
    fn default() -> Self {
        Self {
            sign_timeout_ms: default_sign_timeout_ms(),
            signers: Vec::new(),
            keys: Vec::new(),
        }
    }
}
