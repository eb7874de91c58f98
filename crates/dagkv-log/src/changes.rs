//! Operations committed after an ancestor transaction.

use std::collections::BTreeMap;

use dagkv_core::{Cid, Operation};
use dagkv_store::BlockStore;
use futures::future::try_join_all;

use crate::error::Result;
use crate::handle::{load_transaction, LogHandle};

/// One committed operation and the id of its block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub id: Cid,
    pub op: Operation,
}

/// Per-key history of the operations committed after some ancestor.
///
/// Each history is ordered nearest the root first, so its first element is
/// the latest operation for the key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    by_key: BTreeMap<String, Vec<Change>>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    /// Number of distinct keys changed.
    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.by_key.keys().map(String::as_str)
    }

    pub fn latest(&self, key: &str) -> Option<&Change> {
        self.by_key.get(key).and_then(|history| history.first())
    }

    pub fn history(&self, key: &str) -> Option<&[Change]> {
        self.by_key.get(key).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Change])> {
        self.by_key
            .iter()
            .map(|(key, history)| (key.as_str(), history.as_slice()))
    }

    /// The latest operation for every key, sorted by key.
    pub fn into_latest(self) -> Vec<Operation> {
        self.by_key
            .into_values()
            .filter_map(|history| history.into_iter().next())
            .map(|change| change.op)
            .collect()
    }

    fn record(&mut self, change: Change) {
        self.by_key
            .entry(change.op.key().to_string())
            .or_default()
            .push(change);
    }
}

impl<S: BlockStore> LogHandle<S> {
    /// Every operation committed after `ancestor`, grouped by key.
    ///
    /// Walks `prev` links from the root back to `ancestor` (exclusive). An
    /// ancestor not on the chain makes the walk run to the empty log.
    pub async fn changes_since(&self, ancestor: &Cid) -> Result<ChangeSet> {
        let mut changes = ChangeSet::default();
        let mut cursor = Some(self.root());
        let mut current = Some(self.transaction().clone());
        let batch_size = self.config().batch_size.max(1);

        while let Some(id) = cursor {
            if id == *ancestor {
                break;
            }
            let transaction = match current.take() {
                Some(transaction) => transaction,
                None => load_transaction(&**self.store(), &id).await?,
            };
            tracing::trace!(transaction = %id, ops = transaction.ops.len(), "collecting changes");

            for batch in transaction.ops.chunks(batch_size) {
                let blocks = try_join_all(batch.iter().map(|op| self.store().get(op))).await?;
                for block in blocks {
                    changes.record(Change {
                        id: block.cid(),
                        op: Operation::from_block(&block)?,
                    });
                }
            }
            cursor = transaction.prev;
        }
        Ok(changes)
    }

    /// The latest operation per key committed after `ancestor`.
    pub async fn since(&self, ancestor: &Cid) -> Result<Vec<Operation>> {
        Ok(self.changes_since(ancestor).await?.into_latest())
    }
}
