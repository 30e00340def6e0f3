//! # File Backend
//!
//! Durable medium: one file per key under a directory.
//!
//! ```text
//! <dir>/
//!   escena_auth_state.entry
//!   escena_ui_state.entry
//!   theme.entry                 ← legacy flat key, until migrated
//! ```
//!
//! Writes go to a `.tmp` sibling and are renamed into place, so a crash
//! mid-write leaves the previous value intact.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::{StorageBackend, StorageMedium};
use crate::error::{StorageError, StorageResult};

const ENTRY_EXT: &str = "entry";

#[derive(Debug, Clone)]
pub struct FileBackend {
    dir: PathBuf,
}

impl FileBackend {
    /// Opens (creating if needed) a storage directory.
    pub fn open(dir: impl Into<PathBuf>) -> StorageResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| {
            StorageError::Unavailable(format!("cannot create {}: {}", dir.display(), e))
        })?;
        debug!(dir = %dir.display(), "Opened file storage");
        Ok(Self { dir })
    }

    /// Platform data directory, e.g. `~/.local/share/shared-state`.
    pub fn default_dir() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "escena", "shared-state")
            .map(|dirs| dirs.data_dir().to_path_buf())
    }

    /// Opens the platform data directory.
    pub fn open_default() -> StorageResult<Self> {
        let dir = Self::default_dir()
            .ok_or_else(|| StorageError::Unavailable("no platform data directory".into()))?;
        Self::open(dir)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &str) -> StorageResult<PathBuf> {
        let valid = !key.is_empty()
            && !key.starts_with('.')
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
        if !valid {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.dir.join(format!("{}.{}", key, ENTRY_EXT)))
    }
}

impl StorageBackend for FileBackend {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let path = self.entry_path(key)?;
        match fs::read(&path) {
            Ok(bytes) => String::from_utf8(bytes)
                .map(Some)
                .map_err(|_| StorageError::Corrupt(key.to_string())),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, key: &str, value: &str) -> StorageResult<()> {
        let path = self.entry_path(key)?;
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, value)?;
        if let Err(e) = fs::rename(&tmp, &path) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        let path = self.entry_path(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn keys(&self) -> StorageResult<Vec<String>> {
        let mut keys = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(ENTRY_EXT) {
                continue;
            }
            match path.file_stem().and_then(|s| s.to_str()) {
                Some(stem) => keys.push(stem.to_string()),
                None => warn!(path = %path.display(), "Skipping non UTF-8 storage entry"),
            }
        }
        keys.sort();
        Ok(keys)
    }

    fn medium(&self) -> StorageMedium {
        StorageMedium::Durable
    }
}
