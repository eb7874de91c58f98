//! Error types for replication.

use dagkv_core::{Cid, CoreError};
use dagkv_store::StoreError;
use thiserror::Error;

/// Errors that abort a replication call.
///
/// Absence from the source is not an error; it is reported in the
/// outcome's `missing` set.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The source store failed while fetching a block.
    #[error("source failed fetching {cid}: {source}")]
    Source {
        cid: Cid,
        #[source]
        source: StoreError,
    },

    /// The destination store failed.
    #[error("destination error: {0}")]
    Destination(#[from] StoreError),

    /// A fetched block could not be decoded.
    #[error("core error: {0}")]
    Core(#[from] CoreError),
}

/// Result type for replication.
pub type Result<T> = std::result::Result<T, SyncError>;
