//! Error types for the store module.

use dagkv_core::{Cid, CoreError};
use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The block is not in this store. Absence is a normal status, kept
    /// distinguishable from every other failure.
    #[error("block not found: {0}")]
    Missing(Cid),

    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Stored bytes failed to verify or decode.
    #[error("corrupt block: {0}")]
    Corrupt(#[from] CoreError),

    /// Migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// Any other backend failure (I/O, transport, task join).
    #[error("backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// True when the error only reports absence of a block.
    pub fn is_missing(&self) -> bool {
        matches!(self, StoreError::Missing(_))
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
