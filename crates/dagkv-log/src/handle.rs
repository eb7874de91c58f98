//! LogHandle: a committed transaction plus a staging area.
//!
//! A handle points at one committed [`Transaction`] and keeps uncommitted
//! operations in memory. Reads consult the staged cache first, then the
//! trie. `commit` folds every staged operation into one new transaction
//! and returns a fresh handle; the original handle is left as it was.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_stream::try_stream;
use dagkv_core::{Block, Cid, Operation, Transaction, Value};
use dagkv_store::BlockStore;
use futures::future::try_join_all;
use futures::{pin_mut, Stream, StreamExt};

use crate::error::{LogError, Result};
use crate::trie;

/// Configuration for a log handle.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Maximum number of concurrent store requests issued at once.
    pub batch_size: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self { batch_size: 100 }
    }
}

/// An operation staged for the next commit, with the blocks it brings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Staged {
    pub op: Operation,
    pub op_block: Block,
    /// For a `Set`, the value block first, then any nested blocks.
    pub blocks: Vec<Block>,
}

impl Staged {
    pub fn new(op: Operation, blocks: Vec<Block>) -> Self {
        let op_block = op.to_block();
        Self {
            op,
            op_block,
            blocks,
        }
    }

    pub fn operation_id(&self) -> Cid {
        self.op_block.cid()
    }

    /// The value block of a staged `Set`; `None` for a staged delete.
    pub fn value_block(&self) -> Option<&Block> {
        match self.op {
            Operation::Set { .. } => self.blocks.first(),
            Operation::Delete { .. } => None,
        }
    }
}

/// What [`LogHandle::all`] yields for each key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AllMode {
    /// Decoded values.
    #[default]
    Values,
    /// Raw value blocks.
    Blocks,
    /// Value block ids only; committed values are not read.
    Ids,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    Value(Value),
    Block(Block),
    Id(Cid),
}

fn entry_for(mode: AllMode, block: Block) -> Result<Entry> {
    Ok(match mode {
        AllMode::Values => Entry::Value(block.decode()?),
        AllMode::Blocks => Entry::Block(block),
        AllMode::Ids => Entry::Id(block.cid()),
    })
}

/// The blocks of the canonical empty log: the empty trie node and the
/// transaction pointing at it.
///
/// Every store holding these blocks shares the same empty-log id.
pub fn empty_log() -> (Block, Block) {
    let node = trie::empty_node();
    let transaction = Transaction::empty(node.cid()).to_block();
    (node, transaction)
}

pub(crate) async fn load_transaction<S: BlockStore + ?Sized>(
    store: &S,
    cid: &Cid,
) -> Result<Transaction> {
    let block = store.get(cid).await?;
    Ok(Transaction::from_block(&block)?)
}

/// Put `blocks`, at most `batch_size` at a time.
pub(crate) async fn write_batched<S: BlockStore + ?Sized>(
    store: &S,
    blocks: &[&Block],
    batch_size: usize,
) -> Result<()> {
    for batch in blocks.chunks(batch_size.max(1)) {
        try_join_all(batch.iter().map(|block| store.put(block))).await?;
    }
    Ok(())
}

/// A handle on one committed transaction of a log.
pub struct LogHandle<S: BlockStore> {
    store: Arc<S>,
    root: Cid,
    transaction: Transaction,
    cache: BTreeMap<String, Staged>,
    config: LogConfig,
}

impl<S: BlockStore> Clone for LogHandle<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            root: self.root,
            transaction: self.transaction.clone(),
            cache: self.cache.clone(),
            config: self.config.clone(),
        }
    }
}

impl<S: BlockStore> fmt::Debug for LogHandle<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogHandle")
            .field("root", &self.root)
            .field("head", &self.transaction.head)
            .field("pending", &self.cache.len())
            .finish()
    }
}

impl<S: BlockStore> LogHandle<S> {
    /// Write the canonical empty log to `store` and open it.
    pub async fn empty(store: Arc<S>) -> Result<Self> {
        let (node, transaction) = empty_log();
        store.put(&node).await?;
        store.put(&transaction).await?;
        Self::open(store, transaction.cid()).await
    }

    /// Open the transaction `root`.
    pub async fn open(store: Arc<S>, root: Cid) -> Result<Self> {
        let transaction = load_transaction(&*store, &root).await?;
        Ok(Self {
            store,
            root,
            transaction,
            cache: BTreeMap::new(),
            config: LogConfig::default(),
        })
    }

    pub fn with_config(mut self, config: LogConfig) -> Self {
        self.config = config;
        self
    }

    /// Id of the last committed transaction.
    pub fn root(&self) -> Cid {
        self.root
    }

    /// Trie head of the last committed transaction.
    pub fn head(&self) -> Cid {
        self.transaction.head
    }

    pub fn transaction(&self) -> &Transaction {
        &self.transaction
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn config(&self) -> &LogConfig {
        &self.config
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Staging
    // ─────────────────────────────────────────────────────────────────────────

    /// Number of staged operations.
    pub fn pending(&self) -> usize {
        self.cache.len()
    }

    pub fn is_dirty(&self) -> bool {
        !self.cache.is_empty()
    }

    /// Ids of the staged operation blocks, sorted by key.
    pub fn pending_operation_ids(&self) -> Vec<Cid> {
        self.cache.values().map(Staged::operation_id).collect()
    }

    pub fn staged(&self, key: &str) -> Option<&Staged> {
        self.cache.get(key)
    }

    /// Stage `key = value`, replacing any earlier staged entry for the key.
    ///
    /// Returns the id of the value block.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Cid {
        self.set_with_blocks(key, value, Vec::new())
    }

    /// Stage a value together with blocks it links to; all of them are
    /// written on commit.
    pub fn set_with_blocks(
        &mut self,
        key: impl Into<String>,
        value: impl Into<Value>,
        nested: Vec<Block>,
    ) -> Cid {
        let block = Block::encode(&value.into());
        let cid = block.cid();

        let mut blocks = Vec::with_capacity(nested.len() + 1);
        blocks.push(block);
        blocks.extend(nested);

        self.stage(Staged::new(Operation::set(key, cid), blocks));
        cid
    }

    /// Stage the deletion of `key`. The key need not exist.
    pub fn del(&mut self, key: impl Into<String>) {
        self.stage(Staged::new(Operation::delete(key), Vec::new()));
    }

    pub(crate) fn stage(&mut self, staged: Staged) {
        self.cache.insert(staged.op.key().to_string(), staged);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Reads
    // ─────────────────────────────────────────────────────────────────────────

    /// Id of the value block for `key`.
    pub async fn get_link(&self, key: &str) -> Result<Cid> {
        if let Some(staged) = self.cache.get(key) {
            return staged.op.value().ok_or_else(|| LogError::not_found(key));
        }
        trie::get(&*self.store, &self.transaction.head, key)
            .await?
            .ok_or_else(|| LogError::not_found(key))
    }

    /// The value block for `key`, undecoded.
    pub async fn get_block(&self, key: &str) -> Result<Block> {
        if let Some(staged) = self.cache.get(key) {
            return staged
                .value_block()
                .cloned()
                .ok_or_else(|| LogError::not_found(key));
        }
        let link = self.get_link(key).await?;
        Ok(self.store.get(&link).await?)
    }

    /// The decoded value for `key`.
    ///
    /// Links inside the value are returned as [`Value::Link`] and are not
    /// followed.
    pub async fn get(&self, key: &str) -> Result<Value> {
        Ok(self.get_block(key).await?.decode()?)
    }

    pub async fn has(&self, key: &str) -> Result<bool> {
        match self.cache.get(key) {
            Some(staged) => Ok(staged.op.value().is_some()),
            None => trie::has(&*self.store, &self.transaction.head, key).await,
        }
    }

    /// Every live key with its value, staged entries first.
    ///
    /// Staged deletes hide committed entries. Committed entries come in trie
    /// bucket order, which is not key order.
    pub fn all(&self, mode: AllMode) -> impl Stream<Item = Result<(String, Entry)>> + Send + '_ {
        try_stream! {
            for (key, staged) in &self.cache {
                if let Some(block) = staged.value_block() {
                    yield (key.clone(), entry_for(mode, block.clone())?);
                }
            }

            let committed = trie::entries(&*self.store, self.transaction.head);
            pin_mut!(committed);
            while let Some(item) = committed.next().await {
                let (key, cid) = item?;
                if self.cache.contains_key(&key) {
                    continue;
                }
                let entry = match mode {
                    AllMode::Ids => Entry::Id(cid),
                    _ => entry_for(mode, self.store.get(&cid).await.map_err(LogError::from)?)?,
                };
                yield (key, entry);
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Commit
    // ─────────────────────────────────────────────────────────────────────────

    /// Commit every staged operation as one transaction.
    ///
    /// Writes value blocks, operation blocks and trie nodes before the
    /// transaction itself, so a stored transaction id always has its records
    /// present. Returns a new handle with an empty cache.
    pub async fn commit(&self) -> Result<LogHandle<S>> {
        if self.cache.is_empty() {
            return Err(LogError::NothingToCommit);
        }

        let ops: Vec<Operation> = self.cache.values().map(|s| s.op.clone()).collect();
        let nodes = trie::bulk_update(&*self.store, &self.transaction.head, &ops).await?;
        let head = nodes
            .last()
            .map(Block::cid)
            .ok_or_else(|| LogError::CorruptTrie("bulk update produced no head".into()))?;

        let transaction = Transaction {
            head,
            ops: self.pending_operation_ids(),
            prev: Some(self.root),
        };
        let tx_block = transaction.to_block();

        let mut blocks: Vec<&Block> = Vec::new();
        for staged in self.cache.values() {
            blocks.extend(staged.blocks.iter());
            blocks.push(&staged.op_block);
        }
        blocks.extend(nodes.iter());
        write_batched(&*self.store, &blocks, self.config.batch_size).await?;
        self.store.put(&tx_block).await?;

        tracing::debug!(
            root = %tx_block.cid(),
            prev = %self.root,
            ops = ops.len(),
            blocks = blocks.len() + 1,
            "committed transaction"
        );

        Ok(LogHandle {
            store: Arc::clone(&self.store),
            root: tx_block.cid(),
            transaction,
            cache: BTreeMap::new(),
            config: self.config.clone(),
        })
    }
}
