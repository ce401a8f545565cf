//! Fixed-length Keccak-256 digest.
//!
//! Persisted as a 64-character lowercase hex string so that any stored record
//! can be re-verified independently of this crate.

use std::fmt;
use std::str::FromStr;

use alloy::primitives::{keccak256, B256};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{CoreError, Result};

/// 32-byte digest.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Digest([u8; 32]);

impl Digest {
    /// Sentinel `hash_prev` of the first entry in every chain.
    pub const GENESIS: Digest = Digest([0u8; 32]);

    /// Length of the hex encoding.
    pub const HEX_LEN: usize = 64;

    /// Hash arbitrary bytes with Keccak-256.
    #[must_use]
    pub fn keccak(data: &[u8]) -> Self {
        Self(keccak256(data).0)
    }

    #[must_use]
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    #[must_use]
    pub fn is_genesis(&self) -> bool {
        *self == Self::GENESIS
    }

    /// Lowercase hex without `0x` prefix.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse a 64-character hex string (an optional `0x` prefix is accepted).
    pub fn from_hex(s: &str) -> Result<Self> {
        let trimmed = s.trim().trim_start_matches("0x");
        if trimmed.len() != Self::HEX_LEN {
            return Err(CoreError::InvalidDigest(format!(
                "expected {} hex chars, got {}",
                Self::HEX_LEN,
                trimmed.len()
            )));
        }
        let mut out = [0u8; 32];
        hex::decode_to_slice(trimmed, &mut out)
            .map_err(|e| CoreError::InvalidDigest(e.to_string()))?;
        Ok(Self(out))
    }
}

impl From<B256> for Digest {
    fn from(value: B256) -> Self {
        Self(value.0)
    }
}

impl From<Digest> for B256 {
    fn from(value: Digest) -> Self {
        B256::from(value.0)
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self.to_hex())
    }
}

impl FromStr for Digest {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_hex(s)
    }
}

impl Serialize for Digest {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_genesis_is_zero() {
        assert!(Digest::GENESIS.is_genesis());
        assert_eq!(Digest::GENESIS.to_hex(), "0".repeat(64));
    }

    #[test]
    fn test_keccak_known_vector() {
        // keccak256("") is a well-known constant.
        let d = Digest::keccak(b"");
        assert_eq!(
            d.to_hex(),
            "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }

    #[test]
    fn test_hex_is_fixed_length() {
        let d = Digest::keccak(b"bastion");
        assert_eq!(d.to_hex().len(), Digest::HEX_LEN);
        assert_eq!(Digest::from_hex(&d.to_hex()).unwrap(), d);
        assert_eq!(Digest::from_hex(&format!("0x{}", d.to_hex())).unwrap(), d);
    }

    #[test]
    fn test_from_hex_rejects_bad_length() {
        assert!(matches!(
            Digest::from_hex("abcd"),
            Err(CoreError::InvalidDigest(_))
        ));
    }

    #[test]
    fn test_serde_as_hex_string() {
        let d = Digest::keccak(b"x");
        let json = serde_json::to_string(&d).unwrap();
        assert_eq!(json, format!("\"{}\"", d.to_hex()));
        let back: Digest = serde_json::from_str(&json).unwrap();
        assert_eq!(back, d);
    }
}
