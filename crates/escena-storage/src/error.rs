//! # Storage Error Types
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Propagation                                    │
//! │                                                                         │
//! │  std::io::Error (file backend)                                         │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  StorageError (this module) ← Adds the key and categorization          │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  StoreError::Persistence (escena-sync) ← Logged, never surfaced        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

/// Backend operation errors.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Reading or writing the medium failed.
    ///
    /// ## When This Occurs
    /// - Disk full, permissions, directory removed underneath us
    #[error("Storage I/O failed: {0}")]
    Io(String),

    /// Key contains characters the medium cannot store.
    #[error("Invalid storage key: '{0}'")]
    InvalidKey(String),

    /// The medium could not be opened at all.
    ///
    /// ## When This Occurs
    /// - No platform data directory (sandboxed host)
    /// - Storage directory cannot be created
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    /// A stored value is not valid UTF-8.
    #[error("Corrupt value under '{0}'")]
    Corrupt(String),
}

impl StorageError {
    /// Whether the next persistence cycle may succeed where this one failed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StorageError::Io(_))
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Io(err.to_string())
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
