//! 32-byte content hash used for evidence identity and tamper evidence.
//!
//! Evidence ids are the Keccak256 digest of the normalized evidence payload,
//! so the same observation reported twice hashes to the same id and the
//! store can treat re-submission as an idempotent upsert.

use crate::{Result, TypesError};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha3::{Digest, Keccak256};
use std::fmt;
use std::str::FromStr;

/// Size of a hash in bytes
pub const HASH_SIZE: usize = 32;

/// A 32-byte Keccak256 digest.
///
/// # Example
///
/// ```rust
/// use threatmesh_types::EvidenceHash;
///
/// let hash = EvidenceHash::keccak256(b"203.0.113.42|Malware");
/// let parsed: EvidenceHash = hash.to_hex().parse().unwrap();
/// assert_eq!(hash, parsed);
/// ```
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct EvidenceHash([u8; HASH_SIZE]);

impl EvidenceHash {
    /// The zero hash.
    pub const ZERO: Self = Self([0u8; HASH_SIZE]);

    /// Creates a new hash from a 32-byte array.
    #[inline]
    pub const fn new(bytes: [u8; HASH_SIZE]) -> Self {
        Self(bytes)
    }

    /// Computes the Keccak256 hash of the given data.
    pub fn keccak256(data: &[u8]) -> Self {
        Self::keccak256_concat(&[data])
    }

    /// Computes the Keccak256 hash of multiple fields.
    ///
    /// Each field is length-prefixed so that `["ab", "c"]` and `["a", "bc"]`
    /// never collide.
    pub fn keccak256_concat(fields: &[&[u8]]) -> Self {
        let mut hasher = Keccak256::new();
        for field in fields {
            hasher.update((field.len() as u64).to_be_bytes());
            hasher.update(field);
        }
        let result = hasher.finalize();
        let mut bytes = [0u8; HASH_SIZE];
        bytes.copy_from_slice(&result);
        Self(bytes)
    }

    /// Returns the hash as a byte slice.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Checks if this is the zero hash.
    #[inline]
    pub fn is_zero(&self) -> bool {
        self == &Self::ZERO
    }

    /// Parses a hash from hex, with or without a `0x` prefix.
    pub fn from_hex(s: &str) -> Result<Self> {
        let s = s.strip_prefix("0x").unwrap_or(s);

        if s.len() != HASH_SIZE * 2 {
            return Err(TypesError::InvalidHash(format!(
                "expected 64 hex characters, got {}",
                s.len()
            )));
        }

        let decoded = hex::decode(s)?;
        let mut bytes = [0u8; HASH_SIZE];
        bytes.copy_from_slice(&decoded);
        Ok(Self(bytes))
    }

    /// Returns the lowercase hex representation without prefix.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Short form used in log lines.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..8])
    }
}

impl fmt::Debug for EvidenceHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EvidenceHash({})", self.to_hex())
    }
}

impl fmt::Display for EvidenceHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for EvidenceHash {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_hex(s)
    }
}

impl From<[u8; HASH_SIZE]> for EvidenceHash {
    fn from(bytes: [u8; HASH_SIZE]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for EvidenceHash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Serialize for EvidenceHash {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for EvidenceHash {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_length_prefix_prevents_collisions() {
        let a = EvidenceHash::keccak256_concat(&[b"ab", b"c"]);
        let b = EvidenceHash::keccak256_concat(&[b"a", b"bc"]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_hex_roundtrip_with_prefix() {
        let hash = EvidenceHash::keccak256(b"hello");
        let prefixed = format!("0x{}", hash.to_hex());
        assert_eq!(EvidenceHash::from_hex(&prefixed).unwrap(), hash);
    }

    #[test]
    fn test_invalid_length_rejected() {
        assert!(matches!(
            EvidenceHash::from_hex("abcd"),
            Err(TypesError::InvalidHash(_))
        ));
    }
}
