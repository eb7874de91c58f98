//! BlockStore trait: the abstract interface for block persistence.
//!
//! This trait allows the log and the replication engine to be
//! storage-agnostic. Implementations include SQLite and in-memory; remote
//! backends (HTTP, object storage) only need the same get/put/has contract.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use dagkv_core::{Block, Cid};
use futures::future::{BoxFuture, FutureExt};

use crate::cache::CompletenessCache;
use crate::error::Result;

/// The BlockStore trait: async interface for content-addressed blocks.
///
/// # Design Notes
///
/// - **Absence is a status**: `get` fails with `StoreError::Missing` for an
///   unknown id; every other error is a genuine failure.
/// - **Idempotent puts**: writing a block that already exists is a no-op.
/// - **Completeness cache**: each instance owns one [`CompletenessCache`];
///   it is consulted by [`BlockStoreExt::classify`] and never by `get`/`has`.
/// - **No retries**: transient-fault handling belongs to the implementation.
#[async_trait]
pub trait BlockStore: Send + Sync {
    /// Get a block by id.
    async fn get(&self, cid: &Cid) -> Result<Block>;

    /// Store a block.
    async fn put(&self, block: &Block) -> Result<()>;

    /// Check if a block exists, returning its length when it does.
    async fn has(&self, cid: &Cid) -> Result<Option<u64>>;

    /// The completeness cache bound to this store instance.
    fn completeness(&self) -> &CompletenessCache;
}

#[async_trait]
impl<S: BlockStore + ?Sized> BlockStore for Arc<S> {
    async fn get(&self, cid: &Cid) -> Result<Block> {
        (**self).get(cid).await
    }

    async fn put(&self, block: &Block) -> Result<()> {
        (**self).put(block).await
    }

    async fn has(&self, cid: &Cid) -> Result<Option<u64>> {
        (**self).has(cid).await
    }

    fn completeness(&self) -> &CompletenessCache {
        (**self).completeness()
    }
}

/// Outcome of classifying a DAG against one store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// Every block reachable from the root is present.
    Complete,
    /// Some blocks are absent (`missing`) or present with unverified
    /// children (`incomplete`). At least one set is non-empty.
    Partial {
        missing: BTreeSet<Cid>,
        incomplete: BTreeSet<Cid>,
    },
}

impl Classification {
    pub fn is_complete(&self) -> bool {
        matches!(self, Classification::Complete)
    }

    pub fn missing(&self) -> Option<&BTreeSet<Cid>> {
        match self {
            Classification::Partial { missing, .. } => Some(missing),
            Classification::Complete => None,
        }
    }

    pub fn incomplete(&self) -> Option<&BTreeSet<Cid>> {
        match self {
            Classification::Partial { incomplete, .. } => Some(incomplete),
            Classification::Complete => None,
        }
    }
}

/// Accumulated state of one classification walk.
///
/// `skip` holds every id already visited in the walk, so shared subgraphs
/// are expanded once and a cycle cannot recurse forever.
#[derive(Debug, Default)]
pub struct GraphState {
    pub missing: BTreeSet<Cid>,
    pub incomplete: BTreeSet<Cid>,
    pub skip: HashSet<Cid>,
}

impl GraphState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collapse the accumulated sets into a [`Classification`].
    pub fn into_classification(self) -> Classification {
        if self.missing.is_empty() && self.incomplete.is_empty() {
            Classification::Complete
        } else {
            Classification::Partial {
                missing: self.missing,
                incomplete: self.incomplete,
            }
        }
    }
}

/// Extension trait for DAG-level queries over any block store.
pub trait BlockStoreExt: BlockStore {
    /// Classify the DAG rooted at `cid` against this store.
    ///
    /// `depth` bounds how many hops below the root are verified; a negative
    /// depth only reports the root's own status.
    fn classify(
        &self,
        cid: &Cid,
        depth: i64,
    ) -> impl std::future::Future<Output = Result<Classification>> + Send;

    /// Classify into caller-owned sets, returning whether `cid` is complete.
    fn classify_into<'a>(
        &'a self,
        cid: &Cid,
        depth: i64,
        state: &'a mut GraphState,
    ) -> BoxFuture<'a, Result<bool>>;
}

/// A block whose links are being classified.
struct Frame {
    cid: Cid,
    depth: i64,
    links: Vec<Cid>,
    next: usize,
    complete: bool,
}

/// First look at `cid`: either settled on the spot or a frame to expand.
enum Visit {
    Settled(bool),
    Expand(Frame),
}

async fn visit<S: BlockStore + ?Sized>(
    store: &S,
    cid: Cid,
    depth: i64,
    state: &mut GraphState,
) -> Result<Visit> {
    if !state.skip.insert(cid) {
        // Already visited in this walk: only trust what was proven.
        return Ok(Visit::Settled(store.completeness().contains(&cid)));
    }

    if store.has(&cid).await?.is_none() {
        state.missing.insert(cid);
        return Ok(Visit::Settled(false));
    }

    let links = store.get(&cid).await?.links()?;
    if links.is_empty() {
        store.completeness().mark(cid);
        return Ok(Visit::Settled(true));
    }

    if depth < 0 {
        state.incomplete.insert(cid);
        return Ok(Visit::Settled(false));
    }

    if store.completeness().contains(&cid) {
        return Ok(Visit::Settled(true));
    }

    Ok(Visit::Expand(Frame {
        cid,
        depth,
        links,
        next: 0,
        complete: true,
    }))
}

impl<S: BlockStore + ?Sized> BlockStoreExt for S {
    async fn classify(&self, cid: &Cid, depth: i64) -> Result<Classification> {
        let mut state = GraphState::new();
        self.classify_into(cid, depth, &mut state).await?;
        Ok(state.into_classification())
    }

    fn classify_into<'a>(
        &'a self,
        cid: &Cid,
        depth: i64,
        state: &'a mut GraphState,
    ) -> BoxFuture<'a, Result<bool>> {
        let cid = *cid;
        async move {
            let root = match visit(self, cid, depth, state).await? {
                Visit::Settled(complete) => return Ok(complete),
                Visit::Expand(frame) => frame,
            };

            // Depth-first over an explicit stack; a frame is settled only
            // after every one of its links is.
            let mut stack = vec![root];
            let mut outcome = false;
            while let Some(mut frame) = stack.pop() {
                if frame.next == frame.links.len() {
                    if frame.complete {
                        tracing::trace!(cid = %frame.cid, "marking subgraph complete");
                        self.completeness().mark(frame.cid);
                    }
                    match stack.last_mut() {
                        Some(parent) => parent.complete &= frame.complete,
                        None => outcome = frame.complete,
                    }
                    continue;
                }

                let link = frame.links[frame.next];
                frame.next += 1;

                let mut child = None;
                if self.completeness().contains(&link) {
                    stack.push(frame);
                    continue;
                }
                if self.has(&link).await?.is_none() {
                    state.missing.insert(link);
                    frame.complete = false;
                } else if frame.depth < 1 {
                    state.incomplete.insert(link);
                    frame.complete = false;
                } else {
                    match visit(self, link, frame.depth - 1, state).await? {
                        Visit::Settled(complete) => frame.complete &= complete,
                        Visit::Expand(next) => child = Some(next),
                    }
                }

                stack.push(frame);
                stack.extend(child);
            }
            Ok(outcome)
        }
        .boxed()
    }
}
