//! Log records: operations and transactions.
//!
//! Both are ordinary blocks. An [`Operation`] names a key and either the
//! value block it is set to or its deletion. A [`Transaction`] pairs a trie
//! head with the operations that produced it and a link to the previous
//! transaction, forming an append-only, content-addressed chain.

use crate::block::Block;
use crate::canonical::Value;
use crate::error::{CoreError, Result};
use crate::types::Cid;

/// Field names used in the record encodings.
mod keys {
    pub const SET: &str = "set";
    pub const DEL: &str = "del";
    pub const KEY: &str = "key";
    pub const VAL: &str = "val";
    pub const HEAD: &str = "head";
    pub const OPS: &str = "ops";
    pub const PREV: &str = "prev";
}

/// A single staged or committed change to one key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Point `key` at the block `value`.
    Set { key: String, value: Cid },
    /// Remove `key`.
    Delete { key: String },
}

impl Operation {
    pub fn set(key: impl Into<String>, value: Cid) -> Self {
        Operation::Set {
            key: key.into(),
            value,
        }
    }

    pub fn delete(key: impl Into<String>) -> Self {
        Operation::Delete { key: key.into() }
    }

    pub fn key(&self) -> &str {
        match self {
            Operation::Set { key, .. } | Operation::Delete { key } => key,
        }
    }

    /// The value block referenced by a `Set`.
    pub fn value(&self) -> Option<Cid> {
        match self {
            Operation::Set { value, .. } => Some(*value),
            Operation::Delete { .. } => None,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Operation::Set { key, value } => Value::map([(
                keys::SET,
                Value::map([
                    (keys::KEY, Value::from(key.as_str())),
                    (keys::VAL, Value::Link(*value)),
                ]),
            )]),
            Operation::Delete { key } => Value::map([(
                keys::DEL,
                Value::map([(keys::KEY, Value::from(key.as_str()))]),
            )]),
        }
    }

    pub fn from_value(value: &Value) -> Result<Self> {
        let map = value
            .as_map()
            .filter(|m| m.len() == 1)
            .ok_or_else(|| CoreError::malformed("operation", "expected single-entry map"))?;

        let key_of = |body: &Value| -> Result<String> {
            body.get(keys::KEY)
                .and_then(Value::as_text)
                .map(String::from)
                .ok_or_else(|| CoreError::malformed("operation", "missing key"))
        };

        if let Some(body) = map.get(keys::SET) {
            let value = body
                .get(keys::VAL)
                .and_then(Value::as_link)
                .ok_or_else(|| CoreError::malformed("operation", "set without value link"))?;
            Ok(Operation::Set {
                key: key_of(body)?,
                value,
            })
        } else if let Some(body) = map.get(keys::DEL) {
            Ok(Operation::Delete { key: key_of(body)? })
        } else {
            Err(CoreError::malformed("operation", "unknown operation tag"))
        }
    }

    pub fn to_block(&self) -> Block {
        Block::encode(&self.to_value())
    }

    pub fn from_block(block: &Block) -> Result<Self> {
        Self::from_value(&block.decode()?)
    }
}

/// An immutable commit record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    /// Root node of the trie after this commit.
    pub head: Cid,
    /// Operation blocks applied in this commit, sorted by key.
    pub ops: Vec<Cid>,
    /// The previous transaction, or `None` for the empty log.
    pub prev: Option<Cid>,
}

impl Transaction {
    /// The empty log over the given (empty) trie head.
    pub fn empty(head: Cid) -> Self {
        Self {
            head,
            ops: Vec::new(),
            prev: None,
        }
    }

    pub fn is_empty_log(&self) -> bool {
        self.prev.is_none()
    }

    pub fn to_value(&self) -> Value {
        Value::map([
            (keys::HEAD, Value::Link(self.head)),
            (
                keys::OPS,
                Value::Array(self.ops.iter().copied().map(Value::Link).collect()),
            ),
            (
                keys::PREV,
                self.prev.map(Value::Link).unwrap_or(Value::Null),
            ),
        ])
    }

    pub fn from_value(value: &Value) -> Result<Self> {
        let head = value
            .get(keys::HEAD)
            .and_then(Value::as_link)
            .ok_or_else(|| CoreError::malformed("transaction", "missing head"))?;

        let ops = value
            .get(keys::OPS)
            .and_then(Value::as_array)
            .ok_or_else(|| CoreError::malformed("transaction", "missing ops"))?
            .iter()
            .map(|op| {
                op.as_link()
                    .ok_or_else(|| CoreError::malformed("transaction", "op is not a link"))
            })
            .collect::<Result<Vec<_>>>()?;

        let prev = match value.get(keys::PREV) {
            Some(Value::Link(cid)) => Some(*cid),
            Some(Value::Null) | None => None,
            Some(_) => return Err(CoreError::malformed("transaction", "invalid prev")),
        };

        Ok(Self { head, ops, prev })
    }

    pub fn to_block(&self) -> Block {
        Block::encode(&self.to_value())
    }

    pub fn from_block(block: &Block) -> Result<Self> {
        Self::from_value(&block.decode()?)
    }
}
