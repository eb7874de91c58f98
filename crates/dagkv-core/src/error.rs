//! Error types for dagkv core.

use thiserror::Error;

use crate::types::Cid;

/// Errors that can occur while encoding or decoding blocks and records.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("encoding error: {0}")]
    EncodingError(String),

    #[error("decoding error: {0}")]
    DecodingError(String),

    #[error("malformed {kind}: {reason}")]
    Malformed { kind: &'static str, reason: String },

    #[error("hash mismatch: expected {expected}, computed {computed}")]
    HashMismatch { expected: Cid, computed: Cid },
}

impl CoreError {
    pub(crate) fn malformed(kind: &'static str, reason: impl Into<String>) -> Self {
        CoreError::Malformed {
            kind,
            reason: reason.into(),
        }
    }
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
