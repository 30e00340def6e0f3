//! # escena-sync: State Synchronization Engine for Escena
//!
//! One state tree shared by every independently loaded UI module on the
//! page. Modules read and write slices synchronously; listeners hear about
//! it once per batch window.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Shared State Architecture                          │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │              instance::get_instance() (one per process)          │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               ▼                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                          Store                                   │  │
//! │  │                                                                  │  │
//! │  │  get / set / set_batch / subscribe / actions (login, navigate..) │  │
//! │  └──────┬───────────────────────┬───────────────────────┬──────────┘  │
//! │         ▼                       ▼                       ▼              │
//! │  ┌────────────────┐  ┌────────────────────┐  ┌──────────────────────┐ │
//! │  │ BatchScheduler │  │SubscriptionRegistry│  │ PersistenceCoordinator│ │
//! │  │                │  │                    │  │                      │ │
//! │  │ dirty slices,  │  │ per-slice and '*'  │  │ write-through of     │ │
//! │  │ one 16ms timer │  │ listeners, failure │  │ selected slices,     │ │
//! │  │                │  │ isolation          │  │ 30s safety net       │ │
//! │  └────────────────┘  └────────────────────┘  └──────────────────────┘ │
//! │                                                                         │
//! │  ┌────────────────┐  ┌────────────────────┐  ┌──────────────────────┐ │
//! │  │ LegacyBridge   │  │   SystemMonitor    │  │ TimerHost            │ │
//! │  │ + LegacyMirror │  │                    │  │                      │ │
//! │  │ flat keys in,  │  │ online status,     │  │ tokio tasks or a     │ │
//! │  │ flat keys out  │  │ 5s heartbeat       │  │ manual clock         │ │
//! │  └────────────────┘  └────────────────────┘  └──────────────────────┘ │
//! │                                                                         │
//! │  DEPENDENCIES:                                                         │
//! │  • escena-core: slices, patches, deep merge                            │
//! │  • escena-storage: durable and volatile backends                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`store`] - [`Store`], the write path and flush
//! - [`actions`] - named operations (`login`, `navigate_to`, notifications)
//! - [`scheduler`] - dirty-slice tracking for the batch window
//! - [`registry`] - listener sets and dispatch
//! - [`persistence`] - snapshot restore and write-through
//! - [`legacy`] - flat-key migration and mirror
//! - [`monitor`] - connectivity and heartbeat
//! - [`instance`] - the process-wide store
//! - [`debug`] - tooling surface
//! - [`timer`] - host timer facility
//! - [`config`] - TOML config with env overrides
//! - [`error`] - engine error types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use escena_sync::{instance, StoreConfig};
//! use escena_core::{Theme, UiState};
//!
//! let store = instance::get_instance(Some(StoreConfig::default()))?;
//!
//! let sub = store.subscribe::<UiState, _>(|new, old| {
//!     println!("theme {:?} -> {:?}", old.theme, new.theme);
//!     Ok(())
//! });
//!
//! store.set_theme(Theme::Dark);
//! store.navigate_to("/clubs", Some("clubs"));
//! // ...listeners run on the next batch tick
//! sub.unsubscribe();
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod actions;
pub mod config;
pub mod debug;
pub mod error;
pub mod instance;
pub mod legacy;
pub mod monitor;
pub mod persistence;
pub mod registry;
pub mod scheduler;
pub mod store;
pub mod timer;

#[cfg(test)]
pub(crate) mod testing;

// =============================================================================
// Re-exports
// =============================================================================

pub use actions::BusinessField;
pub use config::{StorageStrategy, StoreConfig};
pub use debug::DebugHandle;
pub use error::{StoreError, StoreResult};
pub use instance::{create_instance, debug_handle, get_instance, get_instance_with};
pub use legacy::{LegacyBridge, LegacyKey, MigrationReport, MigrationState};
pub use monitor::{SystemMonitor, DEFAULT_HEARTBEAT_INTERVAL};
pub use persistence::PersistenceCoordinator;
pub use registry::{DispatchReport, ListenerResult, SliceChange, Subscription};
pub use scheduler::DEFAULT_BATCH_DELAY;
pub use store::{Host, Store, WeakStore};
pub use timer::{ManualTimers, TimerHost, TimerId, TokioTimers};
