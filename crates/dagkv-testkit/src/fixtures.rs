//! Test fixtures and helpers.
//!
//! Common setup code for integration tests: peers with their own stores,
//! forked logs, synthetic DAGs and a store that fails on demand.

use std::collections::HashSet;

use async_trait::async_trait;
use dagkv::{Database, DatabaseConfig};
use dagkv_core::{Block, Cid, Value};
use dagkv_log::LogHandle;
use dagkv_store::{BlockStore, CompletenessCache, MemoryStore, StoreError};

/// One write in a commit: `Some(n)` sets the key to `n`, `None` deletes it.
pub type Write<'a> = (&'a str, Option<i64>);

/// A peer: a database over its own memory store.
pub struct TestFixture {
    pub db: Database<MemoryStore>,
}

impl TestFixture {
    pub fn new() -> Self {
        Self::with_config(DatabaseConfig::default())
    }

    pub fn with_config(config: DatabaseConfig) -> Self {
        Self {
            db: Database::new(MemoryStore::new(), config),
        }
    }

    pub fn store(&self) -> &MemoryStore {
        self.db.store()
    }

    /// Apply `writes` on top of `log` and commit.
    pub async fn commit(
        &self,
        log: &LogHandle<MemoryStore>,
        writes: &[Write<'_>],
    ) -> dagkv::Result<LogHandle<MemoryStore>> {
        let mut next = log.clone();
        for (key, value) in writes {
            match value {
                Some(n) => {
                    next.set(*key, *n);
                }
                None => next.del(*key),
            }
        }
        Ok(next.commit().await?)
    }

    /// A fresh log of `commits` transactions, each setting `per_commit`
    /// keys named `c{commit}/k{index}`.
    pub async fn chain(
        &self,
        commits: usize,
        per_commit: usize,
    ) -> dagkv::Result<LogHandle<MemoryStore>> {
        let mut log = self.db.empty().await?;
        for c in 0..commits {
            for k in 0..per_commit {
                log.set(format!("c{}/k{}", c, k), (c * per_commit + k) as i64);
            }
            log = log.commit().await?;
        }
        Ok(log)
    }

    /// Copy the log under `root` from `other` and open it here.
    pub async fn import_from(
        &self,
        other: &TestFixture,
        root: &Cid,
    ) -> dagkv::Result<LogHandle<MemoryStore>> {
        self.db.import(other.store(), root).await
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// Independent peers, each with an empty store.
pub fn peers(count: usize) -> Vec<TestFixture> {
    (0..count).map(|_| TestFixture::new()).collect()
}

/// Two peers that diverged from a shared base commit.
pub struct Fork {
    pub left_peer: TestFixture,
    pub right_peer: TestFixture,
    pub base: Cid,
    pub left: LogHandle<MemoryStore>,
    pub right: LogHandle<MemoryStore>,
}

impl Fork {
    /// The right-hand chain replicated into the left peer's store, opened
    /// there so it can be pulled.
    pub async fn right_on_left(&self) -> dagkv::Result<LogHandle<MemoryStore>> {
        self.left_peer.import_from(&self.right_peer, &self.right.root()).await
    }

    pub async fn left_on_right(&self) -> dagkv::Result<LogHandle<MemoryStore>> {
        self.right_peer.import_from(&self.left_peer, &self.left.root()).await
    }
}

/// Commit `base` on one peer, share it with a second, then commit `left`
/// and `right` on top of it independently.
pub async fn fork(base: &[Write<'_>], left: &[Write<'_>], right: &[Write<'_>]) -> dagkv::Result<Fork> {
    let left_peer = TestFixture::new();
    let right_peer = TestFixture::new();

    let empty = left_peer.db.empty().await?;
    let shared = left_peer.commit(&empty, base).await?;
    let on_right = right_peer.import_from(&left_peer, &shared.root()).await?;

    let left = left_peer.commit(&shared, left).await?;
    let right = right_peer.commit(&on_right, right).await?;
    Ok(Fork {
        left_peer,
        right_peer,
        base: shared.root(),
        left,
        right,
    })
}

/// A block holding only `label`.
pub fn leaf(label: &str) -> Block {
    Block::encode(&Value::from(label))
}

/// A block holding `label` and a link to each child.
pub fn node(label: &str, children: &[&Block]) -> Block {
    let mut items = vec![Value::from(label)];
    items.extend(children.iter().map(|b| Value::Link(b.cid())));
    Block::encode(&Value::Array(items))
}

/// A synthetic DAG of plain blocks.
#[derive(Debug, Clone)]
pub struct Dag {
    pub root: Block,
    /// Every non-root block, in construction order.
    pub blocks: Vec<Block>,
}

impl Dag {
    /// Build block `i` linking to the earlier blocks named in `parents[i]`.
    /// Indices not below `i` are ignored. The root links every block that
    /// nothing else links to.
    pub fn from_shape(parents: &[Vec<usize>]) -> Self {
        let mut blocks: Vec<Block> = Vec::with_capacity(parents.len());
        let mut linked = vec![false; parents.len()];

        for (i, picks) in parents.iter().enumerate() {
            let mut chosen: Vec<usize> = picks.iter().copied().filter(|&j| j < i).collect();
            chosen.sort_unstable();
            chosen.dedup();

            let mut items = vec![Value::Integer(i as i64)];
            for j in chosen {
                linked[j] = true;
                items.push(Value::Link(blocks[j].cid()));
            }
            blocks.push(Block::encode(&Value::Array(items)));
        }

        let tops = blocks
            .iter()
            .zip(&linked)
            .filter(|(_, linked)| !**linked)
            .map(|(b, _)| Value::Link(b.cid()))
            .collect();
        let root = Block::encode(&Value::Array(tops));
        Self { root, blocks }
    }

    pub fn all(&self) -> impl Iterator<Item = &Block> {
        std::iter::once(&self.root).chain(self.blocks.iter())
    }

    /// Write every block into `store`.
    pub async fn load_into<S: BlockStore + ?Sized>(&self, store: &S) -> dagkv_store::Result<()> {
        for block in self.all() {
            store.put(block).await?;
        }
        Ok(())
    }
}

/// A memory store whose `get` fails with a backend error for chosen ids.
pub struct FailingStore {
    inner: MemoryStore,
    poisoned: HashSet<Cid>,
}

impl FailingStore {
    pub fn new(inner: MemoryStore, poisoned: impl IntoIterator<Item = Cid>) -> Self {
        Self {
            inner,
            poisoned: poisoned.into_iter().collect(),
        }
    }

    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }
}

#[async_trait]
impl BlockStore for FailingStore {
    async fn get(&self, cid: &Cid) -> dagkv_store::Result<Block> {
        if self.poisoned.contains(cid) {
            return Err(StoreError::Backend(format!("injected failure for {}", cid)));
        }
        self.inner.get(cid).await
    }

    async fn put(&self, block: &Block) -> dagkv_store::Result<()> {
        self.inner.put(block).await
    }

    async fn has(&self, cid: &Cid) -> dagkv_store::Result<Option<u64>> {
        self.inner.has(cid).await
    }

    fn completeness(&self) -> &CompletenessCache {
        self.inner.completeness()
    }
}
