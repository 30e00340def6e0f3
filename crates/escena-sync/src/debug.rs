//! # Debug Handle
//!
//! Introspection surface for tooling. Not part of the consumer contract:
//! values cross it as raw JSON and it can wipe persisted state.

use std::sync::Arc;

use serde_json::Value;
use tracing::{info, warn};

use crate::error::StoreResult;
use crate::legacy::LegacyBridge;
use crate::registry::Subscription;
use crate::store::Store;

#[derive(Debug, Clone)]
pub struct DebugHandle {
    store: Store,
}

impl DebugHandle {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// The whole tree as JSON.
    pub fn get_state(&self) -> StoreResult<Value> {
        Ok(serde_json::to_value(self.store.snapshot())?)
    }

    /// Merges a JSON partial into the named slice.
    pub fn set_state(&self, key: &str, partial: Value) -> StoreResult<()> {
        warn!(slice = key, "State written through debug handle");
        self.store.set_json(key, partial)
    }

    /// Calls `listener` with the whole tree as JSON after every flush.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.store.subscribe_all(move |tree| {
            listener(&serde_json::to_value(tree)?);
            Ok(())
        })
    }

    /// Removes every persisted key under the app prefix and the flat legacy
    /// keys, so a cleared session is not imported again on the next start.
    pub fn clear_storage(&self) -> StoreResult<usize> {
        let prefixed = self.store.persistence().clear()?;
        let bridge = LegacyBridge::new(
            &self.store.config().app_prefix,
            Arc::clone(self.store.storage()),
        );
        let legacy = bridge.clear_keys()?;
        info!(prefixed, legacy, "Storage cleared through debug handle");
        Ok(prefixed + legacy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{store_on, test_store};
    use escena_core::AuthState;
    use escena_storage::{MemoryBackend, StorageBackend};
    use serde_json::json;
    use std::sync::Mutex;
    use std::time::Duration;

    #[test]
    fn test_get_and_set_state() {
        let (store, _storage, _timers) = test_store();
        let debug = store.debug();

        debug.set_state("ui", json!({"theme": "dark"})).unwrap();
        let tree = debug.get_state().unwrap();
        assert_eq!(tree["ui"]["theme"], json!("dark"));
        assert_eq!(tree["navigation"]["currentRoute"], json!("/"));
        assert!(debug.set_state("ui", json!({"theme": "neon"})).is_err());
        assert!(debug.set_state("profile", json!({})).is_err());
    }

    #[test]
    fn test_subscribe_receives_json_tree() {
        let (store, _storage, _timers) = test_store();
        let debug = store.debug();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        let sub = debug.subscribe(move |tree| {
            s.lock().unwrap().push(tree["system"]["onlineStatus"].clone());
        });

        store.set_json("system", json!({"onlineStatus": false})).unwrap();
        store.flush();
        sub.unsubscribe();
        store.set_json("system", json!({"onlineStatus": true})).unwrap();
        store.flush();

        assert_eq!(*seen.lock().unwrap(), vec![json!(false)]);
    }

    #[test]
    fn test_clear_storage() {
        let (store, storage, _timers) = test_store();
        store.persist_now();
        assert!(!storage.keys().unwrap().is_empty());
        assert!(store.debug().clear_storage().unwrap() >= 3);
        assert!(storage.keys().unwrap().is_empty());
    }

    #[test]
    fn test_cleared_session_stays_cleared_after_restart() {
        let storage = MemoryBackend::new();
        let (store, timers) = store_on(storage.clone());
        store.login(json!({"id": "u1", "name": "Ana"}), "tok123", None);
        timers.advance(Duration::from_millis(16));
        assert!(storage.get("user").unwrap().is_some());
        assert!(storage.get("escena_auth_state").unwrap().is_some());

        store.debug().clear_storage().unwrap();
        assert!(storage.keys().unwrap().is_empty());
        store.destroy();

        let (restarted, _timers) = store_on(storage.clone());
        let auth = restarted.slice::<AuthState>();
        assert!(!auth.is_authenticated);
        assert_eq!(auth.user, None);
        assert_eq!(auth.token, None);
    }
}
