//! Error types for the database facade.

use dagkv_core::Cid;
use dagkv_log::LogError;
use dagkv_store::StoreError;
use dagkv_sync::SyncError;
use thiserror::Error;

/// Errors that can occur during Database operations.
#[derive(Debug, Error)]
pub enum DbError {
    /// Log or merge error.
    #[error("log error: {0}")]
    Log(#[from] LogError),

    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Replication error.
    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    /// A replicated log is not fully present locally.
    #[error("replica of {root} is incomplete: {missing} missing, {incomplete} unverified")]
    IncompleteReplica {
        root: Cid,
        missing: usize,
        incomplete: usize,
    },
}

/// Result type for Database operations.
pub type Result<T> = std::result::Result<T, DbError>;
