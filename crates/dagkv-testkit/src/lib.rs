//! # dagkv Testkit
//!
//! Testing utilities for dagkv.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Golden vectors**: Canonical bytes of log records, for cross-platform verification
//! - **Generators**: Proptest strategies for keys, values, operations and DAG shapes
//! - **Fixtures**: Peers, forked logs, synthetic DAGs and a failing store
//!
//! ## Golden Vectors
//!
//! ```rust
//! use dagkv_testkit::vectors::verify_all_vectors;
//!
//! for report in verify_all_vectors() {
//!     assert!(report.matches, "{}: {}", report.name, report.bytes);
//! }
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use dagkv_testkit::generators::LogParams;
//!
//! proptest! {
//!     #[test]
//!     fn last_write_wins(params: LogParams) {
//!         let expected = params.expected();
//!         // build the log from `params.commits` and compare
//!     }
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! ```rust,ignore
//! use dagkv_testkit::fixtures::fork;
//!
//! let f = fork(&[("k", Some(0))], &[("x", Some(1))], &[("y", Some(2))]).await?;
//! let mut left = f.left.clone();
//! left.pull(&f.right_on_left().await?).await?;
//! ```

pub mod fixtures;
pub mod generators;
pub mod vectors;

pub use fixtures::{fork, peers, Dag, FailingStore, Fork, TestFixture};
pub use generators::LogParams;
pub use vectors::{all_vectors, export_json, verify_all_vectors, GoldenVector, VectorReport};
