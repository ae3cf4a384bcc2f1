//! Error helpers for `gg-store` backends.
//!
//! `gg_core::store::ThunkStore` fixes the error type its implementations
//! must return (`gg_core::StoreError`), so there is no separate storage
//! error enum here -- just small constructors for the failure modes a
//! filesystem-backed store actually hits.

use std::path::Path;

use gg_core::{Hash, StoreError};

/// Wraps a filesystem I/O failure with the path that triggered it.
pub fn io_error(path: &Path, source: std::io::Error) -> StoreError {
    StoreError::Io(format!("{}: {source}", path.display()))
}

/// A blob was read back but failed to parse as a `Thunk`.
pub fn corrupt(hash: &Hash, reason: impl std::fmt::Display) -> StoreError {
    StoreError::Corrupt {
        hash: hash.clone(),
        reason: reason.to_string(),
    }
}
