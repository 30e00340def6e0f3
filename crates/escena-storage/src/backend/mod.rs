//! # Storage Backends
//!
//! The adapter contract the engine writes through, plus its implementations.
//!
//! ## Backends
//! - [`memory::MemoryBackend`] - volatile; lives as long as the process
//! - [`file::FileBackend`] - durable; one file per key under a directory

pub mod file;
pub mod memory;

use std::fmt::Debug;

use crate::error::StorageResult;

/// How long written values survive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageMedium {
    /// Survives process restarts.
    Durable,
    /// Gone when the process exits.
    Volatile,
}

/// Key-value adapter over a storage medium.
///
/// Values are opaque strings; callers own serialization.
pub trait StorageBackend: Send + Sync + Debug {
    fn get(&self, key: &str) -> StorageResult<Option<String>>;

    fn save(&self, key: &str, value: &str) -> StorageResult<()>;

    /// Removing a missing key is not an error.
    fn remove(&self, key: &str) -> StorageResult<()>;

    /// All stored keys, sorted.
    fn keys(&self) -> StorageResult<Vec<String>>;

    /// Removes every key starting with `prefix`. Returns how many went.
    fn clear_prefix(&self, prefix: &str) -> StorageResult<usize> {
        let mut removed = 0;
        for key in self.keys()? {
            if key.starts_with(prefix) {
                self.remove(&key)?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn clear(&self) -> StorageResult<()> {
        self.clear_prefix("").map(|_| ())
    }

    fn medium(&self) -> StorageMedium;
}
