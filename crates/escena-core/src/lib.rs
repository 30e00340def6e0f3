//! # escena-core: Pure State Model for Escena
//!
//! The shape of the shared state tree, the patch types that change it and
//! the merge rules they follow. No storage, no timers, no dispatch.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Escena Page Composition                           │
//! │                                                                         │
//! │  ┌───────────────┐  ┌───────────────┐  ┌───────────────┐               │
//! │  │  Shell module │  │ Artist module │  │  Club module  │   ...         │
//! │  └───────┬───────┘  └───────┬───────┘  └───────┬───────┘               │
//! │          └──────────────────┼──────────────────┘                        │
//! │                             │ get / set / subscribe                     │
//! │  ┌──────────────────────────▼──────────────────────────────────────┐   │
//! │  │                 escena-sync (Store, scheduler, ...)             │   │
//! │  └──────────────────────────┬──────────────────────────────────────┘   │
//! │                             │                                           │
//! │  ┌──────────────────────────▼──────────────────────────────────────┐   │
//! │  │               ★ escena-core (THIS CRATE) ★                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐   │   │
//! │  │   │   types   │  │   patch   │  │   merge   │  │   error   │   │   │
//! │  │   │GlobalState│  │ UiPatch   │  │deep_merge │  │ CoreError │   │   │
//! │  │   │  slices   │  │ Slice     │  │           │  │           │   │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘   │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - `GlobalState`, the five slices, notifications
//! - [`patch`] - partial updates per slice and the [`patch::Slice`] trait
//! - [`merge`] - deep merge for free-form JSON payloads
//! - [`error`] - domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use escena_core::patch::{SlicePatch, UiPatch};
//! use escena_core::types::{GlobalState, Theme};
//!
//! let mut state = GlobalState::default();
//! SlicePatch::from(UiPatch { theme: Some(Theme::Dark), ..Default::default() })
//!     .apply_to(&mut state);
//!
//! assert_eq!(state.ui.theme, Theme::Dark);
//! assert_eq!(state.ui.primary_color, "#6d28d9");
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod merge;
pub mod patch;
pub mod types;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{CoreError, CoreResult};
pub use merge::deep_merge;
pub use patch::{
    AuthPatch, BusinessPatch, NavigationPatch, Slice, SlicePatch, SystemPatch, UiPatch,
};
pub use types::{
    AuthState, Breadcrumb, BusinessState, GlobalState, Language, NavigationState, NewNotification,
    Notification, NotificationAction, NotificationType, SliceKey, SliceState, SystemErrorEntry,
    SystemState, Theme, UiState,
};

// =============================================================================
// Constants
// =============================================================================

/// Length cap of `navigation.lastVisitedRoutes`.
pub const MAX_VISITED_ROUTES: usize = 10;

/// Length cap of `system.errorQueue`; oldest entries are dropped first.
pub const MAX_ERROR_QUEUE: usize = 50;
