//! # Store Error Types
//!
//! ## Error Categories
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Store Error Categories                            │
//! │                                                                         │
//! │  RETURNED TO CALLERS (API misuse)      LOGGED AT THE BOUNDARY           │
//! │  ────────────────────────────────      ──────────────────────           │
//! │  InvalidSlice                          ListenerExecution                │
//! │  InvalidPatch                          Persistence                      │
//! │  Config                                MigrationParse                   │
//! │  TimerUnavailable                                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Internal faults never reach a consumer. They are built so the log line
//! carries a consistent message, then dropped.

use escena_core::{CoreError, SliceKey};
use escena_storage::StorageError;
use thiserror::Error;

/// Result type alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    // =========================================================================
    // Caller Errors
    // =========================================================================
    /// Unknown slice key passed to `set_json`/`subscribe_key`/`get`.
    #[error("Unknown slice key: '{0}'")]
    InvalidSlice(String),

    /// A JSON partial update does not fit the slice schema.
    #[error("Invalid update for slice '{slice}': {reason}")]
    InvalidPatch { slice: SliceKey, reason: String },

    /// Configuration could not be loaded or failed validation.
    #[error("Invalid store configuration: {0}")]
    Config(String),

    /// No timer facility is available (e.g. no tokio runtime).
    #[error("Timer host unavailable: {0}")]
    TimerUnavailable(String),

    // =========================================================================
    // Absorbed Errors
    // =========================================================================
    /// A subscriber returned an error.
    #[error("Listener for '{slice}' failed: {reason}")]
    ListenerExecution { slice: String, reason: String },

    /// Reading or writing persisted state failed.
    #[error("Persistence failed: {0}")]
    Persistence(String),

    /// A legacy value could not be parsed.
    #[error("Legacy key '{key}' could not be migrated: {reason}")]
    MigrationParse { key: String, reason: String },
}

impl StoreError {
    /// Returns true for errors caused by how the API was called.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            StoreError::InvalidSlice(_) | StoreError::InvalidPatch { .. } | StoreError::Config(_)
        )
    }

    /// Returns true for errors that are logged and swallowed inside the engine.
    pub fn is_absorbed(&self) -> bool {
        matches!(
            self,
            StoreError::ListenerExecution { .. }
                | StoreError::Persistence(_)
                | StoreError::MigrationParse { .. }
        )
    }
}

impl From<CoreError> for StoreError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidSlice(key) => StoreError::InvalidSlice(key),
            CoreError::InvalidPatch { slice, reason } => StoreError::InvalidPatch { slice, reason },
            CoreError::Serialization(msg) => StoreError::Persistence(msg),
        }
    }
}

impl From<StorageError> for StoreError {
    fn from(err: StorageError) -> Self {
        StoreError::Persistence(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Persistence(err.to_string())
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Config(err.to_string())
    }
}

impl From<toml::de::Error> for StoreError {
    fn from(err: toml::de::Error) -> Self {
        StoreError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for StoreError {
    fn from(err: toml::ser::Error) -> Self {
        StoreError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_errors() {
        assert!(StoreError::InvalidSlice("profile".into()).is_user_error());
        assert!(StoreError::Config("empty prefix".into()).is_user_error());
        assert!(!StoreError::Persistence("disk full".into()).is_user_error());
        assert!(StoreError::Persistence("disk full".into()).is_absorbed());
    }

    #[test]
    fn test_core_error_conversion() {
        let err: StoreError = CoreError::InvalidSlice("profile".into()).into();
        assert!(matches!(err, StoreError::InvalidSlice(ref k) if k == "profile"));

        let err: StoreError = StorageError::Io("disk full".into()).into();
        assert!(err.to_string().contains("disk full"));
    }

    #[test]
    fn test_error_display() {
        let err = StoreError::MigrationParse {
            key: "recentRoutes".into(),
            reason: "expected array".into(),
        };
        assert!(err.to_string().contains("recentRoutes"));
    }
}
