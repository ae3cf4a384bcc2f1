//! In-memory implementation of [`ThunkStore`].
//!
//! [`InMemoryThunkStore`] is a first-class backend for unit and property
//! tests: it has identical read/write/blob_path semantics to
//! [`crate::filesystem::FilesystemThunkStore`] but never touches disk.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use gg_core::{Hash, StoreError, Thunk, ThunkStore};

/// A `HashMap`-backed store, guarded by a mutex so it can be shared across
/// a multi-threaded worker pool the way `gg_core::ThunkStore: Send + Sync`
/// requires, even though `gg-core` itself is single-threaded.
#[derive(Default)]
pub struct InMemoryThunkStore {
    blobs: Mutex<HashMap<Hash, Thunk>>,
}

impl InMemoryThunkStore {
    pub fn new() -> InMemoryThunkStore {
        InMemoryThunkStore {
            blobs: Mutex::new(HashMap::new()),
        }
    }

    /// Seeds the store with a thunk directly, bypassing `write`'s hashing
    /// step -- useful when a test already has a pre-built closure to stage.
    pub fn seed(&self, thunk: Thunk) -> Hash {
        let hash = thunk.hash();
        self.blobs
            .lock()
            .expect("InMemoryThunkStore mutex poisoned")
            .insert(hash.clone(), thunk);
        hash
    }
}

impl ThunkStore for InMemoryThunkStore {
    fn read(&self, hash: &Hash) -> Result<Thunk, StoreError> {
        self.blobs
            .lock()
            .expect("InMemoryThunkStore mutex poisoned")
            .get(hash)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(hash.clone()))
    }

    fn write(&self, thunk: &Thunk) -> Result<Hash, StoreError> {
        let hash = thunk.hash();
        self.blobs
            .lock()
            .expect("InMemoryThunkStore mutex poisoned")
            .insert(hash.clone(), thunk.clone());
        Ok(hash)
    }

    fn blob_path(&self, hash: &Hash) -> Result<PathBuf, StoreError> {
        if self
            .blobs
            .lock()
            .expect("InMemoryThunkStore mutex poisoned")
            .contains_key(hash)
        {
            Ok(PathBuf::from(format!("memory://{hash}")))
        } else {
            Err(StoreError::NotFound(hash.clone()))
        }
    }
}
