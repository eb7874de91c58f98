//! Strong type definitions for dagkv.
//!
//! Block identifiers are newtypes so they cannot be confused with other
//! 32-byte values (trie key hashes, raw digests) at compile time.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A 32-byte content identifier, computed as Blake3(block bytes).
///
/// This is the content-address of a block. Two blocks with the same bytes
/// have the same Cid; equality and ordering are bytewise.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Cid(pub [u8; 32]);

impl Cid {
    /// Compute the identifier of the given block bytes.
    pub fn digest(bytes: &[u8]) -> Self {
        Self(*blake3::hash(bytes).as_bytes())
    }

    /// Create a new Cid from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to hex string. This is the string encoding used wherever ids
    /// leave the process.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        if bytes.len() != 32 {
            return Err(hex::FromHexError::InvalidStringLength);
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

impl fmt::Debug for Cid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Cid({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for Cid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for Cid {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl AsRef<[u8]> for Cid {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; 32]> for Cid {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl TryFrom<&[u8]> for Cid {
    type Error = std::array::TryFromSliceError;

    fn try_from(slice: &[u8]) -> Result<Self, Self::Error> {
        let arr: [u8; 32] = slice.try_into()?;
        Ok(Self(arr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cid_hex_roundtrip() {
        let id = Cid::from_bytes([0x42; 32]);
        let recovered = Cid::from_hex(&id.to_hex()).unwrap();
        assert_eq!(id, recovered);
        assert_eq!(id, id.to_string().parse::<Cid>().unwrap());
    }

    #[test]
    fn test_cid_rejects_short_hex() {
        assert!(Cid::from_hex("abcd").is_err());
    }

    #[test]
    fn test_cid_debug_is_truncated() {
        let id = Cid::from_bytes([0xcd; 32]);
        assert_eq!(format!("{:?}", id), "Cid(cdcdcdcdcdcdcdcd)");
        assert_eq!(id.to_string().len(), 64);
    }

    #[test]
    fn test_digest_is_content_derived() {
        assert_eq!(Cid::digest(b"hello"), Cid::digest(b"hello"));
        assert_ne!(Cid::digest(b"hello"), Cid::digest(b"world"));
    }
}
