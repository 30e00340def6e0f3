//! # escena-storage: Backend Adapters for Escena Shared State
//!
//! A small key-value contract over the storage medium, and the two media the
//! engine ships with.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Escena Persistence Flow                          │
//! │                                                                         │
//! │  PersistenceCoordinator / LegacyBridge (escena-sync)                   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                  escena-storage (THIS CRATE)                    │   │
//! │  │                                                                 │   │
//! │  │   ┌──────────────────┐   ┌───────────────┐   ┌──────────────┐  │   │
//! │  │   │  StorageBackend  │   │ MemoryBackend │   │ FileBackend  │  │   │
//! │  │   │     (trait)      │◄──│  (session)    │   │  (durable)   │  │   │
//! │  │   │ get/save/remove  │◄──┼───────────────┼───│ one file per │  │   │
//! │  │   │ keys/clear       │   │ BTreeMap      │   │ key          │  │   │
//! │  │   └──────────────────┘   └───────────────┘   └──────────────┘  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ~/.local/share/shared-state/<key>.entry                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`backend`] - the `StorageBackend` trait and its implementations
//! - [`error`] - storage error types

pub mod backend;
pub mod error;

pub use backend::file::FileBackend;
pub use backend::memory::MemoryBackend;
pub use backend::{StorageBackend, StorageMedium};
pub use error::{StorageError, StorageResult};
