//! # dagkv
//!
//! A content-addressed, replicable key-value transaction log with
//! deterministic merge and depth-bounded DAG replication.
//!
//! ## Overview
//!
//! - **Blocks**: immutable canonical-CBOR values named by their BLAKE3 digest
//! - **Log**: a chain of transactions, each pointing at a hash-trie head
//! - **Merge**: `pull` reconciles two divergent chains key by key
//! - **Replication**: copy exactly the blocks a store lacks, to a depth
//!
//! ## Key Concepts
//!
//! - **Transaction**: Immutable. Commits produce new transactions.
//! - **Handle**: A transaction plus staged writes; `commit` returns a new one.
//! - **Common ancestor**: The most recent transaction two chains share.
//! - **Completeness cache**: A per-store memo of fully present subgraphs.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use dagkv::{Database, DatabaseConfig};
//! use dagkv::store::SqliteStore;
//!
//! async fn example() -> dagkv::Result<()> {
//!     let store = SqliteStore::open("dagkv.db")?;
//!     let db = Database::new(store, DatabaseConfig::default());
//!
//!     let mut log = db.empty().await?;
//!     log.set("greeting", "hello");
//!     let log = log.commit().await?;
//!
//!     // Keep the root; it names this exact state.
//!     let root = log.root();
//!     let reopened = db.open(&root).await?;
//!     assert!(reopened.has("greeting").await?);
//!     Ok(())
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `dagkv::core` - Ids, blocks, values and record encodings
//! - `dagkv::store` - Block stores and DAG classification
//! - `dagkv::log` - Transaction log, trie and merge engine
//! - `dagkv::sync` - Replication engine

pub mod database;
pub mod error;

// Re-export component crates
pub use dagkv_core as core;
pub use dagkv_log as log;
pub use dagkv_store as store;
pub use dagkv_sync as sync;

// Re-export main types for convenience
pub use database::{Database, DatabaseConfig};
pub use error::{DbError, Result};

pub use dagkv_core::{Block, Cid, Operation, Transaction, Value};
pub use dagkv_log::{
    AllMode, Change, ChangeSet, ConflictResolver, Entry, LogConfig, LogError, LogHandle,
    PullReport, RejectConflicts,
};
pub use dagkv_store::{BlockStore, BlockStoreExt, MemoryStore, SqliteStore, StoreError};
pub use dagkv_sync::{replicate, ReplicateConfig, Replication, SyncError};
