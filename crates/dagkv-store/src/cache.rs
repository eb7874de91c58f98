//! Per-store completeness cache.
//!
//! Remembers ids whose entire reachable subgraph was confirmed present in
//! the owning store. It is a memo, never a source of truth: an id is only
//! marked once every descendant has been checked with `has`, and the cache
//! lives and dies with the store instance that owns it.

use std::collections::HashSet;
use std::sync::{PoisonError, RwLock};

use dagkv_core::Cid;

#[derive(Debug, Default)]
pub struct CompletenessCache {
    complete: RwLock<HashSet<Cid>>,
}

impl CompletenessCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, cid: &Cid) -> bool {
        self.complete
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(cid)
    }

    pub fn mark(&self, cid: Cid) {
        self.complete
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(cid);
    }

    /// Forget a single id, e.g. after the backing data was altered outside
    /// this store instance.
    pub fn invalidate(&self, cid: &Cid) -> bool {
        self.complete
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(cid)
    }

    pub fn clear(&self) {
        self.complete
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn len(&self) -> usize {
        self.complete
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
