//! # Error Types
//!
//! Domain errors for the state model.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  escena-core errors (this file)                                        │
//! │  └── CoreError       - unknown slice, patch does not fit the schema    │
//! │                                                                         │
//! │  escena-storage errors (separate crate)                                │
//! │  └── StorageError    - backend read/write failures                     │
//! │                                                                         │
//! │  escena-sync errors (engine)                                           │
//! │  └── StoreError      - what consumers and logs see                     │
//! │                                                                         │
//! │  Flow: CoreError → StoreError ← StorageError                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use crate::types::SliceKey;

/// Errors raised by the pure state model.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A string did not name one of the five slices.
    ///
    /// ## When This Occurs
    /// - `set("profile", ...)` from a consumer module
    /// - A config file lists an unknown slice under `persist`
    #[error("Unknown slice key: '{0}'. Valid keys: auth, ui, navigation, business, system")]
    InvalidSlice(String),

    /// A JSON partial update does not match the slice schema.
    ///
    /// ## When This Occurs
    /// - Unknown field names (`{"thmee": "dark"}`)
    /// - Wrong value types (`{"sidebarCollapsed": "yes"}`)
    /// - Enum values outside the allowed set (`{"theme": "purple"}`)
    #[error("Invalid patch for slice '{slice}': {reason}")]
    InvalidPatch { slice: SliceKey, reason: String },

    /// A slice could not be converted to or from JSON.
    #[error("Serialization failed: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::Serialization(err.to_string())
    }
}

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::InvalidSlice("profile".to_string());
        assert_eq!(
            err.to_string(),
            "Unknown slice key: 'profile'. Valid keys: auth, ui, navigation, business, system"
        );

        let err = CoreError::InvalidPatch {
            slice: SliceKey::Ui,
            reason: "unknown field `thmee`".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid patch for slice 'ui': unknown field `thmee`"
        );
    }
}
