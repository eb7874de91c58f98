//! In-memory implementation of the BlockStore trait.
//!
//! This is primarily for testing and embedding. It has the same semantics
//! as SQLite but keeps everything in memory with no persistence.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use bytes::Bytes;
use dagkv_core::{Block, Cid};

use crate::cache::CompletenessCache;
use crate::error::{Result, StoreError};
use crate::traits::BlockStore;

/// In-memory store implementation.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock.
#[derive(Debug, Default)]
pub struct MemoryStore {
    blocks: RwLock<HashMap<Cid, Bytes>>,
    completeness: CompletenessCache,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of blocks currently stored.
    pub fn len(&self) -> usize {
        self.blocks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All block ids, sorted.
    pub fn ids(&self) -> Vec<Cid> {
        let blocks = self.blocks.read().unwrap_or_else(PoisonError::into_inner);
        let mut ids: Vec<Cid> = blocks.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Remove a block. Intended for tests that need a partial store; the
    /// completeness cache is cleared because any marked ancestor may now be
    /// incomplete.
    pub fn remove(&self, cid: &Cid) -> bool {
        let removed = self
            .blocks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(cid)
            .is_some();
        if removed {
            self.completeness.clear();
        }
        removed
    }
}

#[async_trait]
impl BlockStore for MemoryStore {
    async fn get(&self, cid: &Cid) -> Result<Block> {
        let blocks = self.blocks.read().unwrap_or_else(PoisonError::into_inner);
        match blocks.get(cid) {
            Some(bytes) => Ok(Block::from_parts(*cid, bytes.clone())?),
            None => Err(StoreError::Missing(*cid)),
        }
    }

    async fn put(&self, block: &Block) -> Result<()> {
        let mut blocks = self.blocks.write().unwrap_or_else(PoisonError::into_inner);
        blocks
            .entry(block.cid())
            .or_insert_with(|| block.bytes().clone());
        Ok(())
    }

    async fn has(&self, cid: &Cid) -> Result<Option<u64>> {
        let blocks = self.blocks.read().unwrap_or_else(PoisonError::into_inner);
        Ok(blocks.get(cid).map(|b| b.len() as u64))
    }

    fn completeness(&self) -> &CompletenessCache {
        &self.completeness
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::{BlockStoreExt, Classification};
    use dagkv_core::Value;

    fn leaf(name: &str) -> Block {
        Block::encode(&Value::from(name))
    }

    fn node(children: &[&Block]) -> Block {
        Block::encode(&Value::Array(
            children.iter().map(|b| Value::Link(b.cid())).collect(),
        ))
    }

    #[tokio::test]
    async fn test_memory_store_basic() {
        let store = MemoryStore::new();
        let block = leaf("hello");

        store.put(&block).await.unwrap();
        store.put(&block).await.unwrap();
        assert_eq!(store.len(), 1);

        let retrieved = store.get(&block.cid()).await.unwrap();
        assert_eq!(retrieved, block);
        assert_eq!(store.has(&block.cid()).await.unwrap(), Some(block.len() as u64));
    }

    #[tokio::test]
    async fn test_missing_is_distinguishable() {
        let store = MemoryStore::new();
        let cid = Cid::from_bytes([0xaa; 32]);

        let err = store.get(&cid).await.unwrap_err();
        assert!(err.is_missing());
        assert_eq!(store.has(&cid).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_classify_complete_dag_marks_cache() {
        let store = MemoryStore::new();
        let a = leaf("a");
        let b = leaf("b");
        let mid = node(&[&a]);
        let root = node(&[&mid, &b]);
        for block in [&a, &b, &mid, &root] {
            store.put(block).await.unwrap();
        }

        let result = store.classify(&root.cid(), 8).await.unwrap();
        assert!(result.is_complete());
        assert!(store.completeness().contains(&root.cid()));
        assert!(store.completeness().contains(&mid.cid()));
    }

    #[tokio::test]
    async fn test_classify_reports_missing_child() {
        let store = MemoryStore::new();
        let a = leaf("a");
        let b = leaf("b");
        let root = node(&[&a, &b]);
        store.put(&root).await.unwrap();
        store.put(&a).await.unwrap();

        let result = store.classify(&root.cid(), 8).await.unwrap();
        assert_eq!(result.missing().unwrap().len(), 1);
        assert!(result.missing().unwrap().contains(&b.cid()));
        assert!(!store.completeness().contains(&root.cid()));
    }

    #[tokio::test]
    async fn test_classify_missing_root() {
        let store = MemoryStore::new();
        let root = leaf("absent");

        match store.classify(&root.cid(), 3).await.unwrap() {
            Classification::Partial { missing, incomplete } => {
                assert!(missing.contains(&root.cid()));
                assert!(incomplete.is_empty());
            }
            Classification::Complete => panic!("absent root classified complete"),
        }
    }

    #[tokio::test]
    async fn test_classify_depth_bounds() {
        let store = MemoryStore::new();
        let a = leaf("a");
        let mid = node(&[&a]);
        let root = node(&[&mid]);
        for block in [&a, &mid, &root] {
            store.put(block).await.unwrap();
        }

        // Negative depth: the root itself is reported unverified.
        let shallow = store.classify(&root.cid(), -1).await.unwrap();
        assert_eq!(shallow.incomplete().unwrap().len(), 1);
        assert!(shallow.incomplete().unwrap().contains(&root.cid()));

        // Depth zero: direct children present but unverified.
        let shallow = store.classify(&root.cid(), 0).await.unwrap();
        assert!(shallow.incomplete().unwrap().contains(&mid.cid()));
        assert!(shallow.missing().unwrap().is_empty());

        // Depth one verifies `mid`, whose child sits past the boundary.
        let one = store.classify(&root.cid(), 1).await.unwrap();
        assert!(one.incomplete().unwrap().contains(&a.cid()));

        // Depth two reaches the leaf.
        assert!(store.classify(&root.cid(), 2).await.unwrap().is_complete());
    }

    #[tokio::test]
    async fn test_shared_subgraph_not_marked_from_skip() {
        let store = MemoryStore::new();
        let gone = leaf("gone");
        let shared = node(&[&gone]);
        let left = node(&[&shared]);
        let right = node(&[&shared, &leaf("x")]);
        let root = node(&[&left, &right]);
        for block in [&shared, &left, &right, &root] {
            store.put(block).await.unwrap();
        }
        store.put(&leaf("x")).await.unwrap();

        let result = store.classify(&root.cid(), 8).await.unwrap();
        assert!(result.missing().unwrap().contains(&gone.cid()));
        // `right` reaches `shared` only through the skip set; it must not be
        // marked complete on that basis.
        assert!(!store.completeness().contains(&right.cid()));
        assert!(!store.completeness().contains(&root.cid()));
    }

    #[tokio::test]
    async fn test_remove_clears_cache() {
        let store = MemoryStore::new();
        let a = leaf("a");
        let root = node(&[&a]);
        store.put(&a).await.unwrap();
        store.put(&root).await.unwrap();

        assert!(store.classify(&root.cid(), 4).await.unwrap().is_complete());
        assert!(store.remove(&a.cid()));
        assert!(!store.classify(&root.cid(), 4).await.unwrap().is_complete());
    }

    /// A chain `[i, link(i - 1)]` of `len` blocks over a leaf, bottom first.
    fn chain(len: usize) -> Vec<Block> {
        let mut blocks = vec![leaf("bottom")];
        for i in 1..len {
            let below = blocks[i - 1].cid();
            blocks.push(Block::encode(&Value::Array(vec![
                Value::Integer(i as i64),
                Value::Link(below),
            ])));
        }
        blocks
    }

    #[tokio::test]
    async fn test_classify_deep_chain() {
        let store = MemoryStore::new();
        let blocks = chain(20_000);
        for block in &blocks {
            store.put(block).await.unwrap();
        }
        let top = blocks[blocks.len() - 1].cid();

        assert!(store.classify(&top, i64::MAX).await.unwrap().is_complete());
        assert_eq!(store.completeness().len(), blocks.len());

        // Losing the bottom leaves no block above it proven.
        assert!(store.remove(&blocks[0].cid()));
        match store.classify(&top, i64::MAX).await.unwrap() {
            Classification::Partial {
                missing,
                incomplete,
            } => {
                assert_eq!(missing.into_iter().collect::<Vec<_>>(), vec![blocks[0].cid()]);
                assert!(incomplete.is_empty());
            }
            Classification::Complete => panic!("bottom block was removed"),
        }
        assert!(store.completeness().is_empty());
    }
}
