//! This crate manages the local testdata/binary store: a folder with files indexed by the
//! SHA-256 of their content.
//!
//! Files are stored read-only (the write bit is removed after insertion) and addressed by their
//! hash. The store directory has a soft size cap; the least-recently-used unreferenced files are
//! removed automatically to stay under it. Access to the store directory is exclusive even
//! between processes, via an `fslock` file lock.
//!
//! # Example
//!
//! ```
//! use oj_worker_store::{FileStore, FileStoreKey, ReadFileIterator};
//!
//! # use anyhow::Error;
//! # use std::fs;
//! # use tempfile::TempDir;
//! # fn main() -> Result<(), Error> {
//! # let tmp = TempDir::new().unwrap();
//! # let store_dir = tmp.path().join("store");
//! # let path = tmp.path().join("file.txt");
//! # fs::write(&path, "hello world")?;
//! let store = FileStore::new(&store_dir, 1_000_000, 1_000)?;
//! let key = FileStoreKey::from_file(&path)?;
//! let iter = ReadFileIterator::new(&path)?;
//! let handle = store.store(&key, iter)?;
//! assert!(store.get(&key).is_some());
//! # Ok(())
//! # }
//! ```

#![allow(clippy::upper_case_acronyms)]

#[macro_use]
extern crate log;

use std::collections::HashMap;
use std::fmt::Formatter;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{bail, Context, Error};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::index::FileStoreIndex;
pub use read_file_iterator::ReadFileIterator;

mod index;
mod read_file_iterator;

/// Whether to check a file's content against its key before handing out a handle to it.
const INTEGRITY_CHECKS_ENABLED: bool = false;
/// Name of the lock file guarding exclusive access to the store.
const STORE_LOCK_FILE: &str = "exclusive.lock";
/// Name of the serialized index inside the store directory.
const STORE_INDEX_FILE: &str = "index.bin";

/// The SHA-256 of a file's content, used both as its storage key and as the "content hash" the
/// rest of the engine (compile cache, testcase identity) is built on (spec §3, GLOSSARY).
#[derive(Clone, Eq, PartialEq, Hash)]
pub struct FileStoreKey {
    hash: [u8; 32],
}

impl FileStoreKey {
    /// Hash a file already on disk, streaming it in chunks so large testdata files never need to
    /// be fully resident in memory.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<FileStoreKey, Error> {
        let path = path.as_ref();
        let mut hasher = Sha256::new();
        for chunk in ReadFileIterator::new(path)
            .with_context(|| format!("Cannot read {} to compute its hash", path.display()))?
        {
            hasher.update(&chunk);
        }
        Ok(FileStoreKey {
            hash: hasher.finalize().into(),
        })
    }

    /// Hash an in-memory buffer (used for inline sample data, spec §4.G).
    pub fn from_bytes(data: &[u8]) -> FileStoreKey {
        let mut hasher = Sha256::new();
        hasher.update(data);
        FileStoreKey {
            hash: hasher.finalize().into(),
        }
    }

    /// Hex representation of the hash, used as the on-disk path component.
    pub fn to_hex(&self) -> String {
        self.hash.iter().map(|b| format!("{:02x}", b)).collect()
    }
}

impl std::fmt::Debug for FileStoreKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "FileStoreKey({})", self.to_hex())
    }
}

impl std::fmt::Display for FileStoreKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Serialize for FileStoreKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for FileStoreKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let hex = String::deserialize(deserializer)?;
        if hex.len() != 64 {
            return Err(serde::de::Error::custom("invalid FileStoreKey length"));
        }
        let mut hash = [0u8; 32];
        for (i, byte) in hash.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16)
                .map_err(serde::de::Error::custom)?;
        }
        Ok(FileStoreKey { hash })
    }
}

/// Ref counts of the keys currently referenced by a live `FileStoreHandle`; the flush pass skips
/// anything listed here, no matter how stale.
#[derive(Debug, Default)]
struct LockedFiles {
    ref_counts: HashMap<FileStoreKey, usize>,
}

/// A file store manages all the files inside a store directory.
///
/// It can remove unreferenced files that take too much space (LRU eviction), lock the directory
/// so no other `FileStore` (even in another process) touches it concurrently, and will never
/// evict a file while a live `FileStoreHandle` still references it.
#[derive(Debug)]
pub struct FileStore {
    /// Base directory of the store.
    base_path: PathBuf,
    /// Cross-process exclusive lock on `base_path`, held for the lifetime of the store.
    _lock: fslock::LockFile,
    /// In-memory index of known files, persisted to `STORE_INDEX_FILE` on drop.
    index: Mutex<FileStoreIndex>,
    /// Ref counts of files currently referenced by a live handle.
    locked_files: Arc<Mutex<LockedFiles>>,
    /// Soft upper bound on the total store size, in bytes.
    max_store_size: u64,
    /// Target size to flush down to once `max_store_size` is exceeded.
    min_store_size: u64,
}

/// A reference-counted handle to a file inside the `FileStore`. The file is guaranteed to stay
/// on disk, even across an eviction pass, for as long as at least one handle for its key exists.
#[derive(Debug)]
pub struct FileStoreHandle {
    /// Key (and therefore path) of the referenced file.
    pub key: FileStoreKey,
    /// Path of the file on disk.
    pub path: PathBuf,
    locked_files: Arc<Mutex<LockedFiles>>,
}

impl Clone for FileStoreHandle {
    fn clone(&self) -> Self {
        let mut locked = self.locked_files.lock().unwrap();
        *locked.ref_counts.entry(self.key.clone()).or_insert(0) += 1;
        drop(locked);
        FileStoreHandle {
            key: self.key.clone(),
            path: self.path.clone(),
            locked_files: self.locked_files.clone(),
        }
    }
}

impl Drop for FileStoreHandle {
    fn drop(&mut self) {
        let mut locked = self.locked_files.lock().unwrap();
        if let std::collections::hash_map::Entry::Occupied(mut entry) =
            locked.ref_counts.entry(self.key.clone())
        {
            *entry.get_mut() -= 1;
            if *entry.get() == 0 {
                entry.remove();
            }
        }
    }
}

impl FileStore {
    /// Open (creating if needed) a file store at `base_path`, locking it exclusively for the
    /// lifetime of the returned `FileStore`.
    pub fn new<P: AsRef<Path>>(
        base_path: P,
        max_store_size: u64,
        min_store_size: u64,
    ) -> Result<FileStore, Error> {
        let base_path = base_path.as_ref().to_path_buf();
        std::fs::create_dir_all(&base_path)
            .with_context(|| format!("Cannot create store directory at {}", base_path.display()))?;
        let mut lock = fslock::LockFile::open(&base_path.join(STORE_LOCK_FILE))
            .context("Cannot open store lock file")?;
        if !lock.try_lock().context("Cannot acquire store lock")? {
            bail!(
                "The store at {} is already locked by another process",
                base_path.display()
            );
        }
        let index = FileStoreIndex::load(base_path.join(STORE_INDEX_FILE))?;
        Ok(FileStore {
            base_path,
            _lock: lock,
            index: Mutex::new(index),
            locked_files: Arc::new(Mutex::new(LockedFiles::default())),
            max_store_size,
            min_store_size,
        })
    }

    /// Path on disk corresponding to a key, sharded by the first byte to avoid huge flat
    /// directories.
    pub fn key_to_path(&self, key: &FileStoreKey) -> PathBuf {
        let hex = key.to_hex();
        self.base_path.join(&hex[0..2]).join(&hex[2..])
    }

    /// Insert a file (read through `contents`) into the store under `key`, returning a handle
    /// that keeps it alive. If the key is already known, the existing file is reused and touched.
    pub fn store(
        &self,
        key: &FileStoreKey,
        contents: impl Iterator<Item = Vec<u8>>,
    ) -> Result<FileStoreHandle, Error> {
        let path = self.key_to_path(key);
        let mut index = self.index.lock().unwrap();
        if !path.exists() {
            std::fs::create_dir_all(path.parent().unwrap())
                .with_context(|| format!("Cannot create {}", path.display()))?;
            let tmp = path.with_extension("tmp");
            {
                let mut file = File::create(&tmp)
                    .with_context(|| format!("Cannot create {}", tmp.display()))?;
                for chunk in contents {
                    file.write_all(&chunk)?;
                }
            }
            std::fs::rename(&tmp, &path)
                .with_context(|| format!("Cannot move {} -> {}", tmp.display(), path.display()))?;
            let mut perms = std::fs::metadata(&path)?.permissions();
            perms.set_readonly(true);
            std::fs::set_permissions(&path, perms)?;
            debug!("Stored new file {:?} at {:?}", key, path);
        }
        index.add(key.clone(), &path)?;
        self.maybe_flush(&mut index)?;
        drop(index);
        Ok(self.handle_for(key, path))
    }

    /// Get a handle to a file already in the store, if present.
    pub fn get(&self, key: &FileStoreKey) -> Option<FileStoreHandle> {
        let path = self.key_to_path(key);
        if !path.exists() {
            return None;
        }
        if INTEGRITY_CHECKS_ENABLED {
            match FileStoreKey::from_file(&path) {
                Ok(actual) if &actual == key => {}
                _ => {
                    warn!("File {:?} failed integrity check, dropping", key);
                    let _ = std::fs::remove_file(&path);
                    return None;
                }
            }
        }
        self.index.lock().unwrap().touch(key);
        Some(self.handle_for(key, path))
    }

    fn handle_for(&self, key: &FileStoreKey, path: PathBuf) -> FileStoreHandle {
        let mut locked = self.locked_files.lock().unwrap();
        *locked.ref_counts.entry(key.clone()).or_insert(0) += 1;
        drop(locked);
        FileStoreHandle {
            key: key.clone(),
            path,
            locked_files: self.locked_files.clone(),
        }
    }

    /// Flush the LRU index down to `min_store_size` if `max_store_size` is exceeded.
    fn maybe_flush(&self, index: &mut FileStoreIndex) -> Result<(), Error> {
        if index.need_flush(self.max_store_size) {
            let locked = self.locked_files.lock().unwrap();
            index.flush(self, &locked, self.min_store_size)?;
        }
        Ok(())
    }

    /// Remove a single file from the store directory. Used by the index while flushing.
    fn remove_file(path: &Path) -> std::io::Result<()> {
        std::fs::remove_file(path)
    }
}

impl Drop for FileStore {
    fn drop(&mut self) {
        if let Ok(index) = self.index.lock() {
            if let Err(e) = index.store(self.base_path.join(STORE_INDEX_FILE)) {
                warn!("Failed to persist file store index: {:?}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_and_get() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("data.txt");
        std::fs::write(&path, b"hello world").unwrap();
        let store = FileStore::new(tmp.path().join("store"), 1_000_000, 1_000).unwrap();
        let key = FileStoreKey::from_file(&path).unwrap();
        let handle = store
            .store(&key, ReadFileIterator::new(&path).unwrap())
            .unwrap();
        assert!(handle.path.exists());
        assert!(store.get(&key).is_some());
    }

    #[test]
    fn test_missing_key_returns_none() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = FileStore::new(tmp.path().join("store"), 1_000_000, 1_000).unwrap();
        let key = FileStoreKey::from_bytes(b"nothing stored under this");
        assert!(store.get(&key).is_none());
    }

    #[test]
    fn test_identical_content_same_key() {
        let a = FileStoreKey::from_bytes(b"same content");
        let b = FileStoreKey::from_bytes(b"same content");
        assert_eq!(a, b);
        let c = FileStoreKey::from_bytes(b"different content");
        assert_ne!(a, c);
    }

    #[test]
    fn test_handle_keeps_file_alive_across_flush() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = FileStore::new(tmp.path().join("store"), 100, 10).unwrap();
        let path = tmp.path().join("big.bin");
        std::fs::write(&path, vec![7u8; 90]).unwrap();
        let key = FileStoreKey::from_file(&path).unwrap();
        let handle = store
            .store(&key, ReadFileIterator::new(&path).unwrap())
            .unwrap();
        let mut index = store.index.lock().unwrap();
        let locked = store.locked_files.lock().unwrap();
        index.flush(&store, &locked, 10).unwrap();
        drop(locked);
        drop(index);
        assert!(handle.path.exists());
    }
}
