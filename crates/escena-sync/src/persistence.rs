//! # Persistence Coordinator
//!
//! Best-effort write-through of selected slices.
//!
//! ## Storage Layout
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Persisted Slices                                   │
//! │                                                                         │
//! │  key                          value                                     │
//! │  ───                          ─────                                     │
//! │  escena_auth_state            {"user":{...},"isAuthenticated":true,..} │
//! │  escena_ui_state              {"theme":"dark","language":"es",...}     │
//! │  escena_navigation_state      {"currentRoute":"/clubs",...}            │
//! │                                                                         │
//! │  WHEN WRITTEN                                                           │
//! │  • after every flush that changed a persisted slice                     │
//! │  • every persist interval (30s), all persisted slices                   │
//! │                                                                         │
//! │  FAILURES: logged, skipped; memory stays authoritative                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Snapshots carry no schema version. Restore deep merges the stored JSON
//! over the slice defaults, so added fields pick up defaults and removed
//! fields are ignored; a snapshot that still fails the schema is discarded.

use std::sync::{Arc, Mutex, PoisonError};

use escena_core::{deep_merge, GlobalState, SliceKey, SliceState};
use escena_storage::StorageBackend;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::error::{StoreError, StoreResult};
use crate::registry::Subscription;
use crate::store::Store;

#[derive(Debug)]
pub struct PersistenceCoordinator {
    prefix: String,
    slices: Vec<SliceKey>,
    backend: Arc<dyn StorageBackend>,
    subscriptions: Mutex<Vec<Subscription>>,
}

impl PersistenceCoordinator {
    pub fn new(prefix: &str, mut slices: Vec<SliceKey>, backend: Arc<dyn StorageBackend>) -> Self {
        slices.sort();
        slices.dedup();
        Self {
            prefix: prefix.to_string(),
            slices,
            backend,
            subscriptions: Mutex::new(Vec::new()),
        }
    }

    /// `<prefix>_<slice>_state`
    pub fn storage_key(&self, key: SliceKey) -> String {
        format!("{}_{}_state", self.prefix, key)
    }

    pub fn slices(&self) -> &[SliceKey] {
        &self.slices
    }

    // =========================================================================
    // Restore
    // =========================================================================

    /// Overlays stored snapshots onto `state`. Returns how many slices loaded.
    pub fn restore(&self, state: &mut GlobalState) -> usize {
        let mut restored = 0;
        for &key in &self.slices {
            let storage_key = self.storage_key(key);
            let raw = match self.backend.get(&storage_key) {
                Ok(Some(raw)) => raw,
                Ok(None) => continue,
                Err(e) => {
                    warn!(slice = %key, error = %e, "Could not read persisted slice");
                    continue;
                }
            };
            match Self::decode(key, &raw, state) {
                Ok(slice) => {
                    state.replace_slice(slice);
                    restored += 1;
                }
                Err(e) => {
                    warn!(slice = %key, error = %e, "Discarding corrupt persisted slice");
                }
            }
        }
        if restored > 0 {
            info!(restored, "Restored persisted state");
        }
        restored
    }

    fn decode(key: SliceKey, raw: &str, state: &GlobalState) -> StoreResult<SliceState> {
        let stored: Value = serde_json::from_str(raw)?;
        if !stored.is_object() {
            return Err(StoreError::Persistence(format!(
                "expected a JSON object, found {}",
                raw.chars().take(32).collect::<String>()
            )));
        }
        let mut merged = state.slice(key).to_json()?;
        deep_merge(&mut merged, stored);
        Ok(SliceState::from_json(key, merged)?)
    }

    // =========================================================================
    // Write
    // =========================================================================

    pub fn persist(&self, slice: &SliceState) -> StoreResult<()> {
        let key = slice.key();
        let json = serde_json::to_string(slice)?;
        self.backend.save(&self.storage_key(key), &json)?;
        debug!(slice = %key, bytes = json.len(), "Persisted slice");
        Ok(())
    }

    fn persist_logged(&self, slice: &SliceState) -> bool {
        match self.persist(slice) {
            Ok(()) => true,
            Err(e) => {
                error!(slice = %slice.key(), error = %e, "Failed to persist slice");
                false
            }
        }
    }

    /// Writes every configured slice. Returns how many writes succeeded.
    pub fn persist_all(&self, state: &GlobalState) -> usize {
        self.slices
            .iter()
            .filter(|&&key| self.persist_logged(&state.slice(key)))
            .count()
    }

    /// Subscribes to every configured slice on `store`.
    pub fn attach(self: &Arc<Self>, store: &Store) {
        let mut subscriptions = self
            .subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        for &key in &self.slices {
            let coordinator = Arc::clone(self);
            subscriptions.push(store.subscribe_slice(key, move |change| {
                coordinator.persist_logged(&change.new);
                Ok(())
            }));
        }
    }

    pub fn detach(&self) {
        let subscriptions = std::mem::take(
            &mut *self
                .subscriptions
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        for sub in subscriptions {
            sub.unsubscribe();
        }
    }

    /// Removes every key under the app prefix. Returns how many went.
    pub fn clear(&self) -> StoreResult<usize> {
        let removed = self.backend.clear_prefix(&format!("{}_", self.prefix))?;
        info!(removed, prefix = %self.prefix, "Cleared persisted state");
        Ok(removed)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{store_on, test_store};
    use escena_core::{NavigationState, Theme, UiPatch, UiState};
    use escena_storage::{FileBackend, MemoryBackend};
    use std::time::Duration;

    #[test]
    fn test_persistence_roundtrip() {
        let (store, storage, timers) = test_store();
        store.set::<UiState>(UiPatch {
            theme: Some(Theme::Dark),
            ..Default::default()
        });
        timers.advance(Duration::from_millis(16));
        assert!(storage.get("escena_ui_state").unwrap().is_some());
        store.destroy();

        let (fresh, _timers) = store_on(storage.clone());
        assert_eq!(fresh.slice::<UiState>().theme, Theme::Dark);
    }

    #[test]
    fn test_durable_roundtrip_across_file_backends() {
        let dir = tempfile::tempdir().unwrap();
        {
            let (store, timers) = store_on(FileBackend::open(dir.path()).unwrap());
            store.navigate_to("/artists/42", Some("artists"));
            timers.advance(Duration::from_millis(16));
            store.destroy();
        }

        let (store, _timers) = store_on(FileBackend::open(dir.path()).unwrap());
        let nav = store.slice::<NavigationState>();
        assert_eq!(nav.current_route, "/artists/42");
        assert_eq!(nav.last_visited_routes, vec!["/artists/42"]);
    }

    #[test]
    fn test_unpersisted_slice_not_written() {
        let (store, storage, timers) = test_store();
        store.system_monitor().unwrap().report_error("offline");
        timers.advance(Duration::from_millis(16));
        assert_eq!(storage.get("escena_system_state").unwrap(), None);
    }

    #[test]
    fn test_corrupt_snapshot_falls_back_to_defaults() {
        let storage = MemoryBackend::with_entries([
            ("escena_ui_state", "{not json"),
            ("escena_auth_state", r#""just a string""#),
            ("escena_navigation_state", r#"{"currentRoute": 7}"#),
        ]);
        let (store, _timers) = store_on(storage);
        let state = store.snapshot();
        assert_eq!(state.ui, UiState::default());
        assert!(!state.auth.is_authenticated);
        assert_eq!(state.navigation.current_route, "/");
    }

    #[test]
    fn test_partial_snapshot_keeps_defaults() {
        let storage = MemoryBackend::with_entries([(
            "escena_ui_state",
            r#"{"theme":"dark","retiredField":true}"#,
        )]);
        let (store, _timers) = store_on(storage);
        let ui = store.slice::<UiState>();
        assert_eq!(ui.theme, Theme::Dark);
        assert_eq!(ui.primary_color, "#6d28d9");
    }

    #[test]
    fn test_interval_writes_all_slices() {
        let (_store, storage, timers) = test_store();
        assert!(storage.get("escena_auth_state").unwrap().is_none());
        timers.advance(Duration::from_secs(30));
        for key in ["escena_auth_state", "escena_ui_state", "escena_navigation_state"] {
            assert!(storage.get(key).unwrap().is_some(), "{} missing", key);
        }
    }

    #[test]
    fn test_clear_only_touches_prefix() {
        let storage = MemoryBackend::with_entries([("other_app_state", "{}")]);
        let (store, _timers) = store_on(storage.clone());
        store.persist_now();
        let removed = store.persistence().clear().unwrap();
        assert!(removed >= 3);
        assert_eq!(storage.keys().unwrap(), vec!["other_app_state".to_string()]);
    }
}
