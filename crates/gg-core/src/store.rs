//! The `ThunkStore` collaborator interface consumed by
//! [`crate::graph::ExecutionGraph`].
//!
//! The core is generic over this trait rather than owning a concrete
//! backend: `gg-store` supplies the implementations (in-memory, filesystem),
//! keeping the content-addressed on-disk format entirely out of this crate.

use std::path::PathBuf;

use crate::error::StoreError;
use crate::hash::Hash;
use crate::thunk::Thunk;

/// Read/write access to content-addressed thunk blobs.
///
/// Implementations must be idempotent: writing the same thunk twice (from
/// any thread) returns the same hash and leaves the store in the same
/// state, so concurrent writers racing on one hash are benign.
pub trait ThunkStore: Send + Sync {
    /// Reads and parses the thunk stored under `hash`.
    fn read(&self, hash: &Hash) -> Result<Thunk, StoreError>;

    /// Writes `thunk`'s canonical serialization and returns its content hash.
    fn write(&self, thunk: &Thunk) -> Result<Hash, StoreError>;

    /// The filesystem path of the raw blob named by `hash`, for staging.
    fn blob_path(&self, hash: &Hash) -> Result<PathBuf, StoreError>;
}
