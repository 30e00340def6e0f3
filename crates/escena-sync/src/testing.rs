//! Fixtures for unit tests: stores on in-memory storage and a virtual clock.

use std::sync::Arc;

use escena_storage::{MemoryBackend, StorageBackend};

use crate::config::StoreConfig;
use crate::error::StoreResult;
use crate::store::{Host, Store};
use crate::timer::ManualTimers;

pub(crate) fn test_store() -> (Store, MemoryBackend, ManualTimers) {
    match test_store_with(StoreConfig::default()) {
        Ok(fixture) => fixture,
        Err(e) => panic!("default test store: {}", e),
    }
}

pub(crate) fn test_store_with(
    config: StoreConfig,
) -> StoreResult<(Store, MemoryBackend, ManualTimers)> {
    let storage = MemoryBackend::new();
    let (store, timers) = store_on_with(storage.clone(), config)?;
    Ok((store, storage, timers))
}

pub(crate) fn store_on(storage: impl StorageBackend + 'static) -> (Store, ManualTimers) {
    match store_on_with(storage, StoreConfig::default()) {
        Ok(fixture) => fixture,
        Err(e) => panic!("store on custom storage: {}", e),
    }
}

pub(crate) fn store_on_with(
    storage: impl StorageBackend + 'static,
    config: StoreConfig,
) -> StoreResult<(Store, ManualTimers)> {
    let timers = ManualTimers::new();
    let host = Host::new(Arc::new(storage), Arc::new(timers.clone()));
    Ok((Store::create(config, host)?, timers))
}
