//! # Singleton Access Point
//!
//! One store per process, shared by every module on the page.
//!
//! ```text
//!  module A ─┐
//!  module B ─┼──▶ get_instance(config?) ──▶ INSTANCE (first config wins)
//!  module C ─┘
//!
//!  tests / tools ──▶ create_instance(config, host) ──▶ isolated Store
//! ```

use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, info};

use crate::config::StoreConfig;
use crate::debug::DebugHandle;
use crate::error::StoreResult;
use crate::store::{Host, Store};

static INSTANCE: Mutex<Option<Store>> = Mutex::new(None);

fn slot() -> MutexGuard<'static, Option<Store>> {
    INSTANCE.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Returns the process-wide store, creating it on first call.
///
/// Storage and timers come from [`Host::from_config`], so the first call
/// must happen inside a tokio runtime. `None` loads the default config file.
pub fn get_instance(config: Option<StoreConfig>) -> StoreResult<Store> {
    get_instance_with(config, Host::from_config)
}

/// [`get_instance`] with a custom host factory.
///
/// The factory and the config are only used if no instance exists yet; a
/// later caller's config is ignored.
pub fn get_instance_with<F>(config: Option<StoreConfig>, factory: F) -> StoreResult<Store>
where
    F: FnOnce(&StoreConfig) -> StoreResult<Host>,
{
    let mut slot = slot();
    if let Some(store) = slot.as_ref() {
        if config.is_some() {
            debug!("Store already created, ignoring config");
        }
        return Ok(store.clone());
    }

    let config = match config {
        Some(config) => config,
        None => StoreConfig::load_or_default(None),
    };
    let host = factory(&config)?;
    let store = Store::create(config, host)?;
    info!("Shared store initialized");
    *slot = Some(store.clone());
    Ok(store)
}

/// Builds a store outside the singleton.
pub fn create_instance(config: StoreConfig, host: Host) -> StoreResult<Store> {
    Store::create(config, host)
}

/// Destroys and forgets the process-wide store. Returns true if one existed.
pub fn reset_instance() -> bool {
    let store = slot().take();
    match store {
        Some(store) => {
            store.destroy();
            true
        }
        None => false,
    }
}

/// Debug handle on the shared store, when it exists and `debug` is enabled.
pub fn debug_handle() -> Option<DebugHandle> {
    let store = slot().clone()?;
    store.config().debug.then(|| store.debug())
}
