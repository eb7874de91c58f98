//! Merge engine: pull a remote chain into a local handle.
//!
//! A pull finds the most recent transaction both chains share, compares the
//! per-key changes each side committed after it, and stages the remote
//! side's operations into the local cache. Nothing is committed and the
//! remote handle is only read.
//!
//! Per key changed on the remote side:
//!
//! 1. Not changed locally: accept the remote operation.
//! 2. Same latest operation on both sides: already converged.
//! 3. The local latest operation appears in the remote history: the remote
//!    side built on it, so fast-forward to the remote operation.
//! 4. Otherwise the [`ConflictResolver`] decides.

use std::collections::HashSet;

use dagkv_core::{Block, Cid, Operation};
use dagkv_store::BlockStore;
use futures::future::try_join_all;

use crate::changes::Change;
use crate::error::{LogError, Result};
use crate::handle::{load_transaction, LogHandle, Staged};

/// Decides the outcome for a key both sides changed independently.
pub trait ConflictResolver: Send + Sync {
    /// Return the operation to stage for `key`, or fail the pull.
    ///
    /// Both histories are nearest-first and non-empty.
    fn resolve(&self, key: &str, local: &[Change], remote: &[Change]) -> Result<Operation>;
}

impl<F> ConflictResolver for F
where
    F: Fn(&str, &[Change], &[Change]) -> Result<Operation> + Send + Sync,
{
    fn resolve(&self, key: &str, local: &[Change], remote: &[Change]) -> Result<Operation> {
        self(key, local, remote)
    }
}

/// Fails every conflict with [`LogError::Conflict`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RejectConflicts;

impl ConflictResolver for RejectConflicts {
    fn resolve(&self, key: &str, _local: &[Change], _remote: &[Change]) -> Result<Operation> {
        Err(LogError::Conflict {
            key: key.to_string(),
        })
    }
}

/// Summary of a pull.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullReport {
    /// The common ancestor both change sets were computed from.
    pub ancestor: Cid,
    /// Keys whose remote operation was staged as-is.
    pub accepted: Vec<String>,
    /// Keys staged from the resolver's answer.
    pub resolved: Vec<String>,
    /// Keys whose latest operation was already the same on both sides.
    pub converged: usize,
}

impl PullReport {
    fn new(ancestor: Cid) -> Self {
        Self {
            ancestor,
            accepted: Vec::new(),
            resolved: Vec::new(),
            converged: 0,
        }
    }

    /// Number of operations staged by the pull.
    pub fn staged(&self) -> usize {
        self.accepted.len() + self.resolved.len()
    }
}

async fn prev_of<S: BlockStore + ?Sized>(store: &S, id: Option<Cid>) -> Result<Option<Cid>> {
    match id {
        Some(id) => Ok(load_transaction(store, &id).await?.prev),
        None => Ok(None),
    }
}

/// Find the most recent transaction shared by both chains.
///
/// Walks both `prev` chains in alternating breadth-first steps, one
/// transaction per chain per step, recording visited ids in a set seeded
/// with `known`. The first id found already in the set is the ancestor.
pub async fn find_common_ancestor<L, R>(
    local: &LogHandle<L>,
    remote: &LogHandle<R>,
    known: &HashSet<Cid>,
) -> Result<Cid>
where
    L: BlockStore,
    R: BlockStore,
{
    let mut seen = known.clone();
    let mut local_next = Some(local.root());
    let mut remote_next = Some(remote.root());
    let mut steps = 0usize;

    while local_next.is_some() || remote_next.is_some() {
        for id in [local_next, remote_next].into_iter().flatten() {
            if !seen.insert(id) {
                tracing::debug!(ancestor = %id, steps, "found common ancestor");
                return Ok(id);
            }
        }

        let (l, r) = futures::try_join!(
            prev_of(&**local.store(), local_next),
            prev_of(&**remote.store(), remote_next),
        )?;
        local_next = l;
        remote_next = r;
        steps += 1;
    }

    tracing::debug!(
        local = %local.root(),
        remote = %remote.root(),
        steps,
        "chains share no ancestor"
    );
    Err(LogError::NoCommonAncestor)
}

/// Fetch a value block from the remote store, falling back to the local one.
async fn fetch_value<R, L>(remote: &R, local: &L, cid: &Cid) -> Result<Block>
where
    R: BlockStore + ?Sized,
    L: BlockStore + ?Sized,
{
    match remote.get(cid).await {
        Ok(block) => Ok(block),
        Err(e) if e.is_missing() => Ok(local.get(cid).await?),
        Err(e) => Err(e.into()),
    }
}

impl<S: BlockStore> LogHandle<S> {
    /// Pull `remote` with the default resolver and no ancestor hint.
    pub async fn pull<R: BlockStore>(&mut self, remote: &LogHandle<R>) -> Result<PullReport> {
        self.pull_with(remote, &HashSet::new(), &RejectConflicts).await
    }

    /// Pull `remote` into this handle's staged cache.
    ///
    /// `known` holds transaction ids already known to be shared, such as the
    /// remote root of an earlier pull. The cache is only touched once every
    /// key has been reconciled and every value block fetched, so a failed
    /// pull stages nothing.
    pub async fn pull_with<R: BlockStore>(
        &mut self,
        remote: &LogHandle<R>,
        known: &HashSet<Cid>,
        resolver: &dyn ConflictResolver,
    ) -> Result<PullReport> {
        let ancestor = find_common_ancestor(&*self, remote, known).await?;
        let mut report = PullReport::new(ancestor);

        let remote_changes = remote.changes_since(&ancestor).await?;
        if remote_changes.is_empty() {
            return Ok(report);
        }
        let local_changes = self.changes_since(&ancestor).await?;

        let mut merged = Vec::with_capacity(remote_changes.len());
        for (key, remote_history) in remote_changes.iter() {
            let Some(remote_latest) = remote_history.first() else {
                continue;
            };

            let local_history = match local_changes.history(key) {
                Some(history) if !history.is_empty() => history,
                _ => {
                    report.accepted.push(key.to_string());
                    merged.push(remote_latest.op.clone());
                    continue;
                }
            };
            let local_latest = &local_history[0];

            if local_latest.id == remote_latest.id {
                report.converged += 1;
            } else if remote_history.iter().any(|c| c.id == local_latest.id) {
                report.accepted.push(key.to_string());
                merged.push(remote_latest.op.clone());
            } else {
                let op = resolver.resolve(key, local_history, remote_history)?;
                if op.key() != key {
                    return Err(LogError::InvalidResolution {
                        key: key.to_string(),
                        returned: op.key().to_string(),
                    });
                }
                report.resolved.push(key.to_string());
                merged.push(op);
            }
        }

        let staged = self.stage_from(remote, merged).await?;
        for entry in staged {
            self.stage(entry);
        }

        tracing::debug!(
            ancestor = %ancestor,
            remote = %remote.root(),
            accepted = report.accepted.len(),
            resolved = report.resolved.len(),
            converged = report.converged,
            "pulled remote changes"
        );
        Ok(report)
    }

    /// Pair each merged operation with its value block.
    async fn stage_from<R: BlockStore>(
        &self,
        remote: &LogHandle<R>,
        ops: Vec<Operation>,
    ) -> Result<Vec<Staged>> {
        let mut staged = Vec::with_capacity(ops.len());
        for batch in ops.chunks(self.config().batch_size.max(1)) {
            let fetched = try_join_all(batch.iter().map(|op| async move {
                let blocks = match op.value() {
                    Some(cid) => vec![fetch_value(&**remote.store(), &**self.store(), &cid).await?],
                    None => Vec::new(),
                };
                Ok::<_, LogError>(Staged::new(op.clone(), blocks))
            }))
            .await?;
            staged.extend(fetched);
        }
        Ok(staged)
    }
}
