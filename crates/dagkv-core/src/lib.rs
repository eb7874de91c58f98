//! # dagkv Core
//!
//! Pure primitives for dagkv: content identifiers, blocks, canonical
//! encoding, and the records that make up the transaction log.
//!
//! This crate contains no I/O, no storage, no networking.
//!
//! ## Key Types
//!
//! - [`Cid`] - Content-addressed identifier (Blake3 hash of block bytes)
//! - [`Block`] - Immutable `(Cid, bytes)` pair
//! - [`Value`] - Decoded block value; links stay unresolved references
//! - [`Operation`] - A `Set` or `Delete` of one key
//! - [`Transaction`] - Trie head + operations + link to the previous commit
//!
//! ## Canonicalization
//!
//! All blocks are encoded using deterministic CBOR. See [`canonical`] module.

pub mod block;
pub mod canonical;
pub mod error;
pub mod record;
pub mod types;

pub use block::Block;
pub use canonical::{decode, encode, Value, LINK_TAG};
pub use error::{CoreError, Result};
pub use record::{Operation, Transaction};
pub use types::Cid;
