//! Persistent hash trie mapping keys to value links.
//!
//! Keys are hashed with BLAKE3; each level of the trie consumes one nibble
//! of the hash, giving a 16-way fan-out. A slot holds either a bucket of up
//! to [`BUCKET_SIZE`] entries or a link to a child node.
//!
//! The layout is history independent: a slot is a bucket exactly when its
//! subtree holds at most `BUCKET_SIZE` entries, and buckets are sorted by
//! key. Two logs that reach the same key/value set through different
//! histories therefore reach the same head id, which is what lets merged
//! chains converge.
//!
//! Nodes are never mutated in place. [`bulk_update`] returns the blocks it
//! produced (children before parents, the new head last) and leaves writing
//! them to the caller.

use std::collections::BTreeMap;

use async_stream::try_stream;
use dagkv_core::{Block, Cid, Operation, Value};
use dagkv_store::BlockStore;
use futures::future::{BoxFuture, FutureExt};
use futures::Stream;

use crate::error::{LogError, Result};

/// Maximum number of entries held inline in one slot.
pub const BUCKET_SIZE: usize = 4;

/// Number of slots per node.
const FANOUT: u8 = 16;

/// Nibbles in a BLAKE3 digest; no node exists below this depth.
const MAX_DEPTH: usize = 64;

type KeyHash = [u8; 32];

fn key_hash(key: &str) -> KeyHash {
    *blake3::hash(key.as_bytes()).as_bytes()
}

fn nibble(hash: &KeyHash, depth: usize) -> u8 {
    let byte = hash[depth / 2];
    if depth % 2 == 0 {
        byte >> 4
    } else {
        byte & 0x0f
    }
}

fn corrupt(reason: impl Into<String>) -> LogError {
    LogError::CorruptTrie(reason.into())
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Slot {
    Bucket(Vec<(String, Cid)>),
    Child { cid: Cid, count: u64 },
}

impl Slot {
    fn count(&self) -> u64 {
        match self {
            Slot::Bucket(entries) => entries.len() as u64,
            Slot::Child { count, .. } => *count,
        }
    }

    fn to_value(&self) -> Value {
        match self {
            Slot::Bucket(entries) => Value::map([(
                "bucket",
                Value::Array(
                    entries
                        .iter()
                        .map(|(key, value)| {
                            Value::Array(vec![Value::from(key.as_str()), Value::Link(*value)])
                        })
                        .collect(),
                ),
            )]),
            Slot::Child { cid, count } => Value::map([
                ("child", Value::Link(*cid)),
                ("count", Value::Integer(*count as i64)),
            ]),
        }
    }

    fn from_value(value: &Value) -> Result<Self> {
        if let Some(bucket) = value.get("bucket") {
            let items = bucket
                .as_array()
                .ok_or_else(|| corrupt("bucket must be an array"))?;
            let mut entries = Vec::with_capacity(items.len());
            for item in items {
                match item.as_array() {
                    Some([Value::Text(key), Value::Link(value)]) => {
                        entries.push((key.clone(), *value))
                    }
                    _ => return Err(corrupt("bucket entry must be [key, link]")),
                }
            }
            if entries.is_empty() || entries.windows(2).any(|w| w[0].0 >= w[1].0) {
                return Err(corrupt("bucket must be non-empty and sorted by key"));
            }
            return Ok(Slot::Bucket(entries));
        }

        let cid = value
            .get("child")
            .and_then(Value::as_link)
            .ok_or_else(|| corrupt("slot must be a bucket or a child link"))?;
        let count = value
            .get("count")
            .and_then(Value::as_integer)
            .filter(|n| *n > BUCKET_SIZE as i64)
            .ok_or_else(|| corrupt("child slot count out of range"))?;
        Ok(Slot::Child {
            cid,
            count: count as u64,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Node {
    slots: BTreeMap<u8, Slot>,
}

impl Node {
    fn count(&self) -> u64 {
        self.slots.values().map(Slot::count).sum()
    }

    fn to_block(&self) -> Block {
        let slots = self
            .slots
            .iter()
            .map(|(index, slot)| Value::Array(vec![Value::Integer(*index as i64), slot.to_value()]))
            .collect();
        Block::encode(&Value::map([
            ("count", Value::Integer(self.count() as i64)),
            ("slots", Value::Array(slots)),
        ]))
    }

    fn from_block(block: &Block) -> Result<Self> {
        let value = block.decode()?;
        let items = value
            .get("slots")
            .and_then(Value::as_array)
            .ok_or_else(|| corrupt("node has no slot array"))?;

        let mut slots = BTreeMap::new();
        for item in items {
            let (index, slot) = match item.as_array() {
                Some([Value::Integer(index), slot]) if (0..FANOUT as i64).contains(index) => {
                    (*index as u8, Slot::from_value(slot)?)
                }
                _ => return Err(corrupt("slot must be [index, slot] with index below 16")),
            };
            if slots.insert(index, slot).is_some() {
                return Err(corrupt("duplicate slot index"));
            }
        }

        let node = Node { slots };
        if value.get("count").and_then(Value::as_integer) != Some(node.count() as i64) {
            return Err(corrupt("node count does not match its slots"));
        }
        Ok(node)
    }
}

async fn load<S: BlockStore + ?Sized>(store: &S, cid: &Cid) -> Result<Node> {
    let block = store.get(cid).await?;
    Node::from_block(&block)
}

/// The root node of a trie with no entries.
pub fn empty_node() -> Block {
    Node::default().to_block()
}

/// Number of entries reachable from `head`.
pub async fn count<S: BlockStore + ?Sized>(store: &S, head: &Cid) -> Result<u64> {
    Ok(load(store, head).await?.count())
}

/// Look up the value link stored under `key`.
pub async fn get<S: BlockStore + ?Sized>(store: &S, head: &Cid, key: &str) -> Result<Option<Cid>> {
    let hash = key_hash(key);
    let mut node = load(store, head).await?;
    for depth in 0..MAX_DEPTH {
        match node.slots.remove(&nibble(&hash, depth)) {
            None => return Ok(None),
            Some(Slot::Bucket(entries)) => {
                return Ok(entries
                    .into_iter()
                    .find(|(k, _)| k == key)
                    .map(|(_, value)| value))
            }
            Some(Slot::Child { cid, .. }) => node = load(store, &cid).await?,
        }
    }
    Err(corrupt("child slot below maximum depth"))
}

pub async fn has<S: BlockStore + ?Sized>(store: &S, head: &Cid, key: &str) -> Result<bool> {
    Ok(get(store, head, key).await?.is_some())
}

/// Apply `ops` to the trie at `head`.
///
/// Returns every node written, children before parents; the last block is
/// the new head. Nothing is stored. Operations on the same key apply in
/// order, so the last one wins.
pub async fn bulk_update<S: BlockStore + ?Sized>(
    store: &S,
    head: &Cid,
    ops: &[Operation],
) -> Result<Vec<Block>> {
    let root = load(store, head).await?;
    let hashed = ops.iter().map(|op| (key_hash(op.key()), op)).collect();

    let mut written = Vec::new();
    let root = update(store, root, 0, hashed, &mut written).await?;
    written.push(root.to_block());
    Ok(written)
}

fn update<'a, S: BlockStore + ?Sized>(
    store: &'a S,
    mut node: Node,
    depth: usize,
    ops: Vec<(KeyHash, &'a Operation)>,
    written: &'a mut Vec<Block>,
) -> BoxFuture<'a, Result<Node>> {
    async move {
        if depth >= MAX_DEPTH {
            return Err(corrupt("child slot below maximum depth"));
        }

        let mut groups: BTreeMap<u8, Vec<(KeyHash, &Operation)>> = BTreeMap::new();
        for (hash, op) in ops {
            groups.entry(nibble(&hash, depth)).or_default().push((hash, op));
        }

        for (index, group) in groups {
            let slot = match node.slots.remove(&index) {
                None => rebuild(BTreeMap::new(), depth + 1, &group, written),
                Some(Slot::Bucket(entries)) => {
                    rebuild(entries.into_iter().collect(), depth + 1, &group, written)
                }
                Some(Slot::Child { cid, .. }) => {
                    let child = load(store, &cid).await?;
                    let child = update(store, child, depth + 1, group, &mut *written).await?;
                    collapse(child, written)?
                }
            };
            if let Some(slot) = slot {
                node.slots.insert(index, slot);
            }
        }
        Ok(node)
    }
    .boxed()
}

/// Apply a group of operations to the entries of a bucket slot.
fn rebuild(
    mut entries: BTreeMap<String, Cid>,
    child_depth: usize,
    group: &[(KeyHash, &Operation)],
    written: &mut Vec<Block>,
) -> Option<Slot> {
    for (_, op) in group {
        match op {
            Operation::Set { key, value } => {
                entries.insert(key.clone(), *value);
            }
            Operation::Delete { key } => {
                entries.remove(key);
            }
        }
    }
    slot_for(entries, child_depth, written)
}

/// The canonical slot for a set of entries.
fn slot_for(
    entries: BTreeMap<String, Cid>,
    child_depth: usize,
    written: &mut Vec<Block>,
) -> Option<Slot> {
    if entries.is_empty() {
        None
    } else if entries.len() <= BUCKET_SIZE || child_depth >= MAX_DEPTH {
        Some(Slot::Bucket(entries.into_iter().collect()))
    } else {
        let count = entries.len() as u64;
        let block = build(entries, child_depth, written).to_block();
        let cid = block.cid();
        written.push(block);
        Some(Slot::Child { cid, count })
    }
}

fn build(entries: BTreeMap<String, Cid>, depth: usize, written: &mut Vec<Block>) -> Node {
    let mut groups: BTreeMap<u8, BTreeMap<String, Cid>> = BTreeMap::new();
    for (key, value) in entries {
        let index = nibble(&key_hash(&key), depth);
        groups.entry(index).or_default().insert(key, value);
    }

    let mut node = Node::default();
    for (index, group) in groups {
        if let Some(slot) = slot_for(group, depth + 1, written) {
            node.slots.insert(index, slot);
        }
    }
    node
}

/// Re-derive the slot for an updated child node.
fn collapse(child: Node, written: &mut Vec<Block>) -> Result<Option<Slot>> {
    let count = child.count();
    if count == 0 {
        return Ok(None);
    }

    if count as usize <= BUCKET_SIZE {
        let mut entries = Vec::with_capacity(count as usize);
        for slot in child.slots.into_values() {
            match slot {
                Slot::Bucket(bucket) => entries.extend(bucket),
                Slot::Child { .. } => return Err(corrupt("child slot under a small subtree")),
            }
        }
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        return Ok(Some(Slot::Bucket(entries)));
    }

    let block = child.to_block();
    let cid = block.cid();
    written.push(block);
    Ok(Some(Slot::Child { cid, count }))
}

/// Every `(key, value)` entry reachable from `head`, in bucket order.
///
/// Nodes are loaded lazily as the stream is polled.
pub fn entries<'a, S: BlockStore + ?Sized>(
    store: &'a S,
    head: Cid,
) -> impl Stream<Item = Result<(String, Cid)>> + Send + 'a {
    try_stream! {
        let mut pending = vec![head];
        while let Some(cid) = pending.pop() {
            let node = load(store, &cid).await?;
            for slot in node.slots.into_values() {
                match slot {
                    Slot::Bucket(bucket) => {
                        for entry in bucket {
                            yield entry;
                        }
                    }
                    Slot::Child { cid: child, .. } => pending.push(child),
                }
            }
        }
    }
}
