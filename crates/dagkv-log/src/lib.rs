//! # dagkv Log
//!
//! The transaction log and merge engine for dagkv.
//!
//! ## Overview
//!
//! A log is a chain of immutable [`Transaction`](dagkv_core::Transaction)
//! blocks. Each transaction names the trie head produced by its commit, the
//! operations applied, and the transaction before it. A [`LogHandle`] opens
//! one transaction and stages new writes in memory until `commit`.
//!
//! Merging two divergent chains is a `pull`: find the common ancestor,
//! reconcile per-key changes, stage the result, then commit as usual.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use dagkv_log::LogHandle;
//! use dagkv_store::MemoryStore;
//!
//! async fn example() -> dagkv_log::Result<()> {
//!     let mut log = LogHandle::empty(Arc::new(MemoryStore::new())).await?;
//!     log.set("greeting", "hello");
//!     let log = log.commit().await?;
//!
//!     let mut fork = log.clone();
//!     fork.set("other", "value");
//!     let fork = fork.commit().await?;
//!
//!     let mut log = log;
//!     log.pull(&fork).await?;
//!     let merged = log.commit().await?;
//!     assert_eq!(merged.head(), fork.head());
//!     Ok(())
//! }
//! ```

pub mod changes;
pub mod error;
pub mod handle;
pub mod merge;
pub mod trie;

pub use changes::{Change, ChangeSet};
pub use error::{LogError, Result};
pub use handle::{empty_log, AllMode, Entry, LogConfig, LogHandle, Staged};
pub use merge::{find_common_ancestor, ConflictResolver, PullReport, RejectConflicts};
