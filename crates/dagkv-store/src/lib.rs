//! # dagkv Store
//!
//! Storage abstraction for dagkv. Provides a trait-based interface for
//! content-addressed block persistence with SQLite and in-memory
//! implementations.
//!
//! ## Key Types
//!
//! - [`BlockStore`] - The async trait for get/put/has
//! - [`BlockStoreExt`] - DAG classification built on top of any store
//! - [`CompletenessCache`] - Per-store memo of fully present subgraphs
//! - [`SqliteStore`] - SQLite-based persistent storage
//! - [`MemoryStore`] - In-memory storage for tests and embedding
//!
//! ## Usage
//!
//! ```rust,no_run
//! use dagkv_core::{Block, Value};
//! use dagkv_store::{BlockStore, BlockStoreExt, SqliteStore};
//!
//! async fn example() -> dagkv_store::Result<()> {
//!     let store = SqliteStore::open("blocks.db")?;
//!
//!     let block = Block::encode(&Value::from("hello"));
//!     store.put(&block).await?;
//!
//!     let status = store.classify(&block.cid(), 1024).await?;
//!     assert!(status.is_complete());
//!     Ok(())
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Idempotent puts**: Writing the same block twice is a no-op
//! - **Absence is not failure**: `StoreError::Missing` is distinguishable
//! - **Completeness is a memo**: truth is always `has`

pub mod cache;
pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use cache::CompletenessCache;
pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{BlockStore, BlockStoreExt, Classification, GraphState};
