//! Error types for the transaction log and merge engine.

use dagkv_core::CoreError;
use dagkv_store::StoreError;
use thiserror::Error;

/// Errors that can occur during log operations.
#[derive(Debug, Error)]
pub enum LogError {
    /// Key is absent from both the staged cache and the trie.
    #[error("key not found: {key}")]
    NotFound { key: String },

    /// `commit` was called with no staged operations.
    #[error("nothing to commit")]
    NothingToCommit,

    /// The two chains share no visited transaction.
    #[error("no common ancestor between local and remote logs")]
    NoCommonAncestor,

    /// Both sides changed the same key and the resolver refused.
    #[error("conflict on key: {key}")]
    Conflict { key: String },

    /// A resolver returned an operation for a different key.
    #[error("resolver for key {key} returned an operation for {returned}")]
    InvalidResolution { key: String, returned: String },

    /// A trie node violates the layout invariants.
    #[error("corrupt trie node: {0}")]
    CorruptTrie(String),

    /// Storage error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Block encoding or decoding error.
    #[error("core error: {0}")]
    Core(#[from] CoreError),
}

impl LogError {
    pub(crate) fn not_found(key: &str) -> Self {
        LogError::NotFound {
            key: key.to_string(),
        }
    }
}

/// Result type for log operations.
pub type Result<T> = std::result::Result<T, LogError>;
