//! Depth-bounded replication of a block DAG between two stores.
//!
//! Replication classifies the root against the destination, fetches the
//! missing blocks from the source in bounded concurrent batches, writes
//! them, and descends into whatever is still unverified with one less unit
//! of depth. Blocks the destination already holds in full are never
//! re-fetched, and the destination's completeness cache keeps repeated
//! calls cheap.
//!
//! Depth semantics:
//!
//! - `depth >= n` verifies and transfers everything within `n` hops of the
//!   root.
//! - `depth < 0` only classifies; nothing is fetched.
//! - A block fetched with zero depth remaining is written and its direct
//!   links are reported `incomplete` without being fetched or checked.

use std::collections::{BTreeSet, HashSet, VecDeque};

use dagkv_core::{Block, Cid};
use dagkv_store::{BlockStore, BlockStoreExt, Classification, GraphState};
use futures::future::try_join_all;

use crate::error::{Result, SyncError};

/// Configuration for replication.
#[derive(Debug, Clone)]
pub struct ReplicateConfig {
    /// Hops below the root to verify. Negative means classify only.
    pub depth: i64,
    /// Maximum concurrent fetches from the source.
    pub batch_size: usize,
}

impl Default for ReplicateConfig {
    fn default() -> Self {
        Self {
            depth: 1024,
            batch_size: 100,
        }
    }
}

/// Outcome of a replication call.
///
/// A partial outcome is expected data, not a failure: `missing` blocks were
/// absent from the source too, `incomplete` blocks are present in the
/// destination with children that were not verified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Replication {
    Complete,
    Partial {
        missing: BTreeSet<Cid>,
        incomplete: BTreeSet<Cid>,
    },
}

impl Replication {
    pub fn is_complete(&self) -> bool {
        matches!(self, Replication::Complete)
    }

    pub fn missing(&self) -> Option<&BTreeSet<Cid>> {
        match self {
            Replication::Partial { missing, .. } => Some(missing),
            Replication::Complete => None,
        }
    }

    pub fn incomplete(&self) -> Option<&BTreeSet<Cid>> {
        match self {
            Replication::Partial { incomplete, .. } => Some(incomplete),
            Replication::Complete => None,
        }
    }

    /// Missing ids as hex strings.
    pub fn missing_hex(&self) -> Vec<String> {
        self.missing()
            .map(|ids| ids.iter().map(Cid::to_hex).collect())
            .unwrap_or_default()
    }

    /// Incomplete ids as hex strings.
    pub fn incomplete_hex(&self) -> Vec<String> {
        self.incomplete()
            .map(|ids| ids.iter().map(Cid::to_hex).collect())
            .unwrap_or_default()
    }
}

impl From<Classification> for Replication {
    fn from(classification: Classification) -> Self {
        match classification {
            Classification::Complete => Replication::Complete,
            Classification::Partial {
                missing,
                incomplete,
            } => Replication::Partial {
                missing,
                incomplete,
            },
        }
    }
}

/// One replication run between a source and a destination.
///
/// The session's skip set records every id a fetch was attempted for, so
/// shared subgraphs are requested from the source at most once. Seeding it
/// with [`with_skip`](Self::with_skip) carries that across calls.
pub struct ReplicationSession<'a, S: ?Sized, D: ?Sized> {
    source: &'a S,
    destination: &'a D,
    config: ReplicateConfig,
    skip: HashSet<Cid>,
    fetched: usize,
}

impl<'a, S, D> ReplicationSession<'a, S, D>
where
    S: BlockStore + ?Sized,
    D: BlockStore + ?Sized,
{
    pub fn new(source: &'a S, destination: &'a D, config: ReplicateConfig) -> Self {
        Self {
            source,
            destination,
            config,
            skip: HashSet::new(),
            fetched: 0,
        }
    }

    pub fn with_skip(mut self, skip: HashSet<Cid>) -> Self {
        self.skip = skip;
        self
    }

    /// Blocks written to the destination so far.
    pub fn fetched(&self) -> usize {
        self.fetched
    }

    pub fn skip(&self) -> &HashSet<Cid> {
        &self.skip
    }

    /// Replicate the DAG rooted at `root`.
    pub async fn run(&mut self, root: &Cid) -> Result<Replication> {
        let mut totals = GraphState::new();
        let mut queue = VecDeque::from([(*root, self.config.depth)]);
        while let Some((id, depth)) = queue.pop_front() {
            for child in self.step(id, depth, &mut totals).await? {
                queue.push_back((child, depth - 1));
            }
        }

        // Ids reported at a depth boundary may have been completed through
        // another path.
        let cache = self.destination.completeness();
        totals.incomplete.retain(|cid| !cache.contains(cid));

        let outcome = Replication::from(totals.into_classification());
        tracing::debug!(
            root = %root,
            depth = self.config.depth,
            fetched = self.fetched,
            complete = outcome.is_complete(),
            "replication finished"
        );
        Ok(outcome)
    }

    /// Classify `id`, fetch what the destination lacks, and return the ids
    /// still to descend into with one less unit of depth.
    async fn step(
        &mut self,
        id: Cid,
        depth: i64,
        totals: &mut GraphState,
    ) -> Result<BTreeSet<Cid>> {
        let (missing, mut incomplete) = match self.destination.classify(&id, depth).await? {
            Classification::Complete => return Ok(BTreeSet::new()),
            Classification::Partial {
                missing,
                incomplete,
            } => (missing, incomplete),
        };

        if depth < 0 {
            totals.missing.extend(missing);
            totals.incomplete.extend(incomplete);
            return Ok(BTreeSet::new());
        }

        // A skipped id was already requested and is still absent.
        let mut wanted = Vec::with_capacity(missing.len());
        for cid in missing {
            if self.skip.insert(cid) {
                wanted.push(cid);
            } else {
                totals.missing.insert(cid);
            }
        }

        for batch in wanted.chunks(self.config.batch_size.max(1)) {
            let fetched = self.fetch_batch(batch).await?;

            let mut present = Vec::with_capacity(fetched.len());
            for (cid, block) in batch.iter().zip(fetched) {
                let Some(block) = block else {
                    totals.missing.insert(*cid);
                    continue;
                };
                if depth == 0 {
                    let cache = self.destination.completeness();
                    for link in block.links()? {
                        if !cache.contains(&link) {
                            totals.incomplete.insert(link);
                        }
                    }
                } else {
                    incomplete.insert(*cid);
                }
                present.push(block);
            }

            try_join_all(present.iter().map(|block| self.destination.put(block))).await?;
            self.fetched += present.len();
            tracing::debug!(
                requested = batch.len(),
                written = present.len(),
                depth,
                "replicated batch"
            );
        }

        Ok(incomplete)
    }

    /// Fetch a batch concurrently. Absent blocks come back as `None`; any
    /// other source failure aborts the batch.
    async fn fetch_batch(&self, batch: &[Cid]) -> Result<Vec<Option<Block>>> {
        try_join_all(batch.iter().map(|cid| async move {
            match self.source.get(cid).await {
                Ok(block) => Ok(Some(block)),
                Err(e) if e.is_missing() => Ok(None),
                Err(e) => Err(SyncError::Source {
                    cid: *cid,
                    source: e,
                }),
            }
        }))
        .await
    }
}

/// Replicate `root` from `source` into `destination`.
pub async fn replicate<S, D>(
    root: &Cid,
    source: &S,
    destination: &D,
    depth: i64,
    batch_size: usize,
) -> Result<Replication>
where
    S: BlockStore + ?Sized,
    D: BlockStore + ?Sized,
{
    let config = ReplicateConfig { depth, batch_size };
    replicate_with_config(root, source, destination, &config).await
}

pub async fn replicate_with_config<S, D>(
    root: &Cid,
    source: &S,
    destination: &D,
    config: &ReplicateConfig,
) -> Result<Replication>
where
    S: BlockStore + ?Sized,
    D: BlockStore + ?Sized,
{
    ReplicationSession::new(source, destination, config.clone())
        .run(root)
        .await
}

/// Check whether `store` holds every block reachable from `root`.
pub async fn verify_replica<D: BlockStore + ?Sized>(root: &Cid, store: &D) -> Result<Replication> {
    Ok(store.classify(root, i64::MAX).await?.into())
}
