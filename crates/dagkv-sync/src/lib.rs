//! # dagkv Sync
//!
//! Replication of content-addressed block DAGs between stores.
//!
//! ## Overview
//!
//! Given a root id, a source and a destination, replication transfers
//! exactly the blocks the destination lacks to hold the root's DAG up to a
//! requested depth. Absent blocks are reported, not raised: a partial
//! replica is a normal outcome.
//!
//! ## Key Properties
//!
//! - **Idempotent**: replicating a complete root fetches nothing
//! - **Bounded**: at most `batch_size` source fetches are in flight
//! - **Deduplicated**: shared subgraphs are requested once per session
//! - **Cached**: the destination's completeness cache short-circuits
//!   subgraphs already verified
//!
//! ## Usage
//!
//! ```rust,no_run
//! use dagkv_core::Cid;
//! use dagkv_store::{MemoryStore, SqliteStore};
//! use dagkv_sync::{replicate_with_config, ReplicateConfig};
//!
//! async fn example(root: Cid, remote: &MemoryStore) -> dagkv_sync::Result<()> {
//!     let local = SqliteStore::open("replica.db")?;
//!     let outcome = replicate_with_config(&root, remote, &local, &ReplicateConfig::default()).await?;
//!     if !outcome.is_complete() {
//!         println!("still missing: {:?}", outcome.missing_hex());
//!     }
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod replicate;

pub use error::{Result, SyncError};
pub use replicate::{
    replicate, replicate_with_config, verify_replica, ReplicateConfig, Replication,
    ReplicationSession,
};
