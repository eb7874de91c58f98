//! Golden test vectors for deterministic verification.
//!
//! These vectors pin the canonical bytes of the records every
//! implementation must agree on. Block ids are the BLAKE3 digest of those
//! bytes, so matching bytes imply matching ids.

use dagkv_core::{Block, Cid, Operation, Transaction};
use dagkv_log::trie;
use serde::{Deserialize, Serialize};

/// A golden test vector.
#[derive(Debug, Clone)]
pub struct GoldenVector {
    /// Human-readable name for the vector.
    pub name: &'static str,
    /// The block under test.
    pub block: Block,
    /// Expected canonical bytes (hex).
    pub expected_hex: String,
}

/// The outcome of checking one vector, in a form other implementations
/// can consume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorReport {
    pub name: String,
    pub bytes: String,
    pub cid: String,
    pub matches: bool,
}

/// Get all golden test vectors.
pub fn all_vectors() -> Vec<GoldenVector> {
    let value = Cid::from_bytes([0x11; 32]);
    let head = Cid::from_bytes([0x22; 32]);
    let op = Cid::from_bytes([0x33; 32]);
    let prev = Cid::from_bytes([0x44; 32]);

    vec![
        GoldenVector {
            name: "empty trie node",
            block: trie::empty_node(),
            // {"count": 0, "slots": []}
            expected_hex: "a265636f756e740065736c6f747380".into(),
        },
        GoldenVector {
            name: "delete operation",
            block: Operation::delete("a").to_block(),
            // {"del": {"key": "a"}}
            expected_hex: "a16364656ca1636b65796161".into(),
        },
        GoldenVector {
            name: "set operation",
            block: Operation::set("a", value).to_block(),
            // {"set": {"key": "a", "val": 42(h'11..')}}
            expected_hex: format!("a163736574a2636b657961616376616cd82a5820{}", "11".repeat(32)),
        },
        GoldenVector {
            name: "empty log transaction",
            block: Transaction::empty(head).to_block(),
            // {"ops": [], "head": 42(h'22..'), "prev": null}
            expected_hex: format!("a3636f7073806468656164d82a5820{}6470726576f6", "22".repeat(32)),
        },
        GoldenVector {
            name: "transaction with one op",
            block: Transaction {
                head,
                ops: vec![op],
                prev: Some(prev),
            }
            .to_block(),
            expected_hex: format!(
                "a3636f707381d82a5820{}6468656164d82a5820{}6470726576d82a5820{}",
                "33".repeat(32),
                "22".repeat(32),
                "44".repeat(32)
            ),
        },
    ]
}

/// Check every vector, reporting actual bytes and ids.
pub fn verify_all_vectors() -> Vec<VectorReport> {
    all_vectors()
        .iter()
        .map(|v| {
            let bytes = hex::encode(v.block.bytes());
            VectorReport {
                name: v.name.to_string(),
                matches: bytes == v.expected_hex,
                bytes,
                cid: v.block.cid().to_hex(),
            }
        })
        .collect()
}

/// Export the vector reports as pretty JSON.
pub fn export_json() -> serde_json::Result<String> {
    serde_json::to_string_pretty(&verify_all_vectors())
}
