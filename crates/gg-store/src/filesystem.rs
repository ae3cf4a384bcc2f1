//! Filesystem-backed implementation of [`ThunkStore`].
//!
//! [`FilesystemThunkStore`] is the "real" backend `gg-cli` drives: a
//! content-addressed blob directory on disk. Serialization is `serde_json`,
//! canonical because `Thunk`'s fields are all `BTreeMap`s/`Vec`s that
//! serialize in a fixed, sorted order.

use std::fs;
use std::path::{Path, PathBuf};

use gg_core::{Hash, StoreError, Thunk, ThunkStore};

use crate::error::{corrupt, io_error};

/// A directory of content-addressed thunk blobs, one file per hash under
/// `<root>/blobs/`.
pub struct FilesystemThunkStore {
    root: PathBuf,
}

impl FilesystemThunkStore {
    /// Opens (creating if necessary) a blob directory rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> std::io::Result<FilesystemThunkStore> {
        let root = root.into();
        fs::create_dir_all(root.join("blobs"))?;
        Ok(FilesystemThunkStore { root })
    }

    fn path_for(&self, hash: &Hash) -> PathBuf {
        // `base()` strips any `#output` suffix -- blobs are always keyed by
        // the unsuffixed hash of the serialized thunk itself.
        self.root.join("blobs").join(hash.base().as_str())
    }
}

impl ThunkStore for FilesystemThunkStore {
    fn read(&self, hash: &Hash) -> Result<Thunk, StoreError> {
        let path = self.path_for(hash);
        let bytes = fs::read(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StoreError::NotFound(hash.base())
            } else {
                io_error(&path, e)
            }
        })?;
        serde_json::from_slice::<Thunk>(&bytes).map_err(|e| corrupt(&hash.base(), e))
    }

    fn write(&self, thunk: &Thunk) -> Result<Hash, StoreError> {
        let hash = thunk.hash();
        let path = self.path_for(&hash);
        if path.exists() {
            // Content-addressed and write-once: an existing blob under this
            // hash is byte-for-byte identical by construction, so there's
            // nothing to do.
            return Ok(hash);
        }
        let bytes = serde_json::to_vec_pretty(thunk).map_err(|e| corrupt(&hash, e))?;
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, &bytes).map_err(|e| io_error(&tmp, e))?;
        fs::rename(&tmp, &path).map_err(|e| io_error(&path, e))?;
        Ok(hash)
    }

    fn blob_path(&self, hash: &Hash) -> Result<PathBuf, StoreError> {
        let path = self.path_for(hash);
        if path.exists() {
            Ok(path)
        } else {
            Err(StoreError::NotFound(hash.base()))
        }
    }
}

/// Returns the directory a [`FilesystemThunkStore`] rooted at `root` keeps
/// its blobs in, without requiring the store to be opened first.
pub fn blobs_dir(root: &Path) -> PathBuf {
    root.join("blobs")
}

#[cfg(test)]
mod tests {
    use super::*;
    use gg_core::{ArgvEntry, Function};
    use std::collections::BTreeMap;

    fn sample_thunk(tag: &str) -> Thunk {
        Thunk::new(
            Function {
                executable: Hash::parse(format!("X{tag}")).unwrap(),
                argv: vec![ArgvEntry::Literal("run".to_string())],
            },
            BTreeMap::new(),
            BTreeMap::new(),
            BTreeMap::new(),
            vec!["out".to_string()],
        )
    }

    #[test]
    fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilesystemThunkStore::new(dir.path()).unwrap();
        let thunk = sample_thunk("a");
        let hash = store.write(&thunk).unwrap();
        assert_eq!(store.read(&hash).unwrap(), thunk);
    }

    #[test]
    fn write_is_idempotent_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilesystemThunkStore::new(dir.path()).unwrap();
        let thunk = sample_thunk("b");
        let h1 = store.write(&thunk).unwrap();
        let h2 = store.write(&thunk).unwrap();
        assert_eq!(h1, h2);
    }

    #[test]
    fn read_missing_hash_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilesystemThunkStore::new(dir.path()).unwrap();
        let missing = Hash::parse("Tmissing").unwrap();
        assert!(matches!(store.read(&missing), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn blob_path_points_at_the_written_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilesystemThunkStore::new(dir.path()).unwrap();
        let thunk = sample_thunk("c");
        let hash = store.write(&thunk).unwrap();
        let path = store.blob_path(&hash).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn reopening_the_same_root_sees_prior_writes() {
        let dir = tempfile::tempdir().unwrap();
        let hash = {
            let store = FilesystemThunkStore::new(dir.path()).unwrap();
            store.write(&sample_thunk("d")).unwrap()
        };
        let reopened = FilesystemThunkStore::new(dir.path()).unwrap();
        assert!(reopened.read(&hash).is_ok());
    }
}
