//! Durable key-value storage for small blobs.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use crate::error::{StorageError, StorageResult};

/// Atomic storage for small files.
///
/// Writes MUST be atomic: after a crash the blob holds either the complete old
/// content or the complete new content, never a mix. File-backed implementations
/// write to a temporary file, sync it, and rename it over the target.
///
/// Names may contain `/` to group blobs (e.g. `credentials/<key>.json`).
pub trait AtomicBlobStore: Send + Sync {
    /// Reads a blob by name. `Ok(None)` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if reading fails (e.g., I/O error, permission denied).
    fn read(&self, name: &str) -> StorageResult<Option<Vec<u8>>>;

    /// Atomically writes a blob, replacing any existing content.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn write_atomic(&self, name: &str, bytes: &[u8]) -> StorageResult<()>;

    /// Deletes a blob. Deleting a missing blob succeeds.
    ///
    /// # Errors
    ///
    /// Only returns an error for actual I/O failures.
    fn delete(&self, name: &str) -> StorageResult<()>;
}

/// Blob store rooted at a directory on disk.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    /// Opens (and creates if needed) a store under `root`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn open(root: impl AsRef<Path>) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// The directory this store writes to.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, name: &str) -> StorageResult<PathBuf> {
        let valid = !name.is_empty()
            && name.split('/').all(|segment| {
                !segment.is_empty()
                    && segment != "."
                    && segment != ".."
                    && !segment.contains('\\')
            });
        if !valid {
            return Err(StorageError::BlobStore(format!("invalid blob name {name:?}")));
        }
        Ok(self.root.join(name))
    }
}

impl AtomicBlobStore for FsBlobStore {
    fn read(&self, name: &str) -> StorageResult<Option<Vec<u8>>> {
        match fs::read(self.path_for(name)?) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write_atomic(&self, name: &str, bytes: &[u8]) -> StorageResult<()> {
        let path = self.path_for(name)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut tmp = path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        let mut file = File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        drop(file);
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn delete(&self, name: &str) -> StorageResult<()> {
        match fs::remove_file(self.path_for(name)?) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-memory blob store for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored blobs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.blobs.read().map_or(0, |blobs| blobs.len())
    }

    /// Whether the store holds no blobs.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned<T>(_: T) -> StorageError {
    StorageError::Lock("memory blob store poisoned".to_string())
}

impl AtomicBlobStore for MemoryBlobStore {
    fn read(&self, name: &str) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.blobs.read().map_err(poisoned)?.get(name).cloned())
    }

    fn write_atomic(&self, name: &str, bytes: &[u8]) -> StorageResult<()> {
        self.blobs
            .write()
            .map_err(poisoned)?
            .insert(name.to_string(), bytes.to_vec());
        Ok(())
    }

    fn delete(&self, name: &str) -> StorageResult<()> {
        self.blobs.write().map_err(poisoned)?.remove(name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exercise(store: &dyn AtomicBlobStore) {
        assert_eq!(store.read("queue.json").unwrap(), None);
        store.write_atomic("queue.json", b"[1]").unwrap();
        store.write_atomic("queue.json", b"[1,2]").unwrap();
        assert_eq!(store.read("queue.json").unwrap().unwrap(), b"[1,2]");

        store.write_atomic("credentials/abc.json", b"{}").unwrap();
        assert_eq!(store.read("credentials/abc.json").unwrap().unwrap(), b"{}");

        store.delete("queue.json").unwrap();
        store.delete("queue.json").unwrap();
        assert_eq!(store.read("queue.json").unwrap(), None);
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryBlobStore::new();
        exercise(&store);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_fs_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::open(dir.path().join("claimkit")).unwrap();
        exercise(&store);
        assert!(store.root().join("credentials/abc.json").exists());
        assert!(!store.root().join("credentials/abc.json.tmp").exists());
    }

    #[test]
    fn test_fs_store_rejects_escaping_names() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::open(dir.path()).unwrap();
        for name in ["", "../x", "a//b", "/etc/passwd", "a/./b"] {
            assert!(store.write_atomic(name, b"x").is_err(), "{name}");
        }
    }
}
