//! Block: the immutable, content-addressed storage unit.
//!
//! A block pairs canonical bytes with the [`Cid`] derived from them. Blocks
//! are never edited; a changed value is a new block with a new id.

use bytes::Bytes;

use crate::canonical::{self, Value};
use crate::error::{CoreError, Result};
use crate::types::Cid;

/// An immutable (identifier, bytes) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    cid: Cid,
    bytes: Bytes,
}

impl Block {
    /// Create a block from raw bytes, computing its identifier.
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        let bytes = bytes.into();
        Self {
            cid: Cid::digest(&bytes),
            bytes,
        }
    }

    /// Rebuild a block read back from storage, verifying the digest.
    pub fn from_parts(cid: Cid, bytes: impl Into<Bytes>) -> Result<Self> {
        let block = Self::new(bytes);
        if block.cid != cid {
            return Err(CoreError::HashMismatch {
                expected: cid,
                computed: block.cid,
            });
        }
        Ok(block)
    }

    /// Encode a value into a block.
    pub fn encode(value: &Value) -> Self {
        Self::new(canonical::encode(value))
    }

    pub fn cid(&self) -> Cid {
        self.cid
    }

    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Decode the block's value.
    pub fn decode(&self) -> Result<Value> {
        canonical::decode(&self.bytes)
    }

    /// Outgoing links (child identifiers) of this block.
    pub fn links(&self) -> Result<Vec<Cid>> {
        Ok(self.decode()?.links())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_id_matches_bytes() {
        let block = Block::encode(&Value::from("hello"));
        assert_eq!(block.cid(), Cid::digest(block.bytes()));
        assert_eq!(block.decode().unwrap(), Value::from("hello"));
    }

    #[test]
    fn test_from_parts_verifies_digest() {
        let block = Block::encode(&Value::Integer(7));
        let ok = Block::from_parts(block.cid(), block.bytes().clone()).unwrap();
        assert_eq!(ok, block);

        let err = Block::from_parts(Cid::from_bytes([0; 32]), block.bytes().clone());
        assert!(matches!(err, Err(CoreError::HashMismatch { .. })));
    }

    #[test]
    fn test_leaf_has_no_links() {
        let leaf = Block::encode(&Value::from("leaf"));
        assert!(leaf.links().unwrap().is_empty());

        let parent = Block::encode(&Value::Array(vec![Value::Link(leaf.cid())]));
        assert_eq!(parent.links().unwrap(), vec![leaf.cid()]);
    }
}
