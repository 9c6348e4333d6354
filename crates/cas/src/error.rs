//! Errors returned by content store operations.

use std::io;

use thiserror::Error;

use crate::hash::{ContentHash, HashError};

/// Errors from `ContentStore` operations.
///
/// A miss is not an error: `get` returns `Ok(None)` for absent content.
#[derive(Debug, Error)]
pub enum CasError {
    /// The payload does not hash to the key it was stored under.
    #[error("hash mismatch: expected {expected}, payload hashes to {actual}")]
    HashMismatch {
        expected: ContentHash,
        actual: ContentHash,
    },

    #[error("invalid content hash: {0}")]
    InvalidHash(#[from] HashError),

    #[error("CAS is in read-only mode")]
    ReadOnly,

    #[error("failed to {op}: {source}")]
    Io {
        op: &'static str,
        #[source]
        source: io::Error,
    },
}

impl CasError {
    pub(crate) fn io(op: &'static str) -> impl FnOnce(io::Error) -> Self {
        move |source| CasError::Io { op, source }
    }
}

pub type Result<T, E = CasError> = std::result::Result<T, E>;
