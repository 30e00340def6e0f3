//! # Slice Patches
//!
//! Partial updates, one patch type per slice.
//!
//! ## Field Semantics
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Patch Fields                                    │
//! │                                                                         │
//! │  JSON input          Rust field             Effect on the slice        │
//! │  ──────────          ──────────             ───────────────────        │
//! │  key absent          None                   untouched                  │
//! │  "key": null         Some(None)             cleared (nullable only)    │
//! │  "key": {...}        Some(Some(v))          opaque: deep merged        │
//! │  "key": [...]        Some(vec)              replaced                   │
//! │  "key": "x" / 1 / b  Some(x)                replaced                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Patches reject unknown fields, so the string-keyed `set_json` surface is
//! checked against the schema before anything is touched.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::error::{CoreError, CoreResult};
use crate::merge::merge_opaque;
use crate::types::{
    normalize_routes, AuthState, Breadcrumb, BusinessState, GlobalState, Language,
    NavigationState, Notification, SliceKey, SliceState, SystemErrorEntry, SystemState, Theme,
    UiState,
};

/// Maps an explicit `null` to `Some(None)`; a missing key stays `None` via `default`.
fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

// =============================================================================
// Patch Types
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AuthPatch {
    #[serde(default, deserialize_with = "nullable")]
    pub user: Option<Option<Value>>,
    pub is_authenticated: Option<bool>,
    #[serde(default, deserialize_with = "nullable")]
    pub token: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub refresh_token: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub last_login_time: Option<Option<DateTime<Utc>>>,
}

impl AuthPatch {
    /// Patch that puts every auth field back to its default.
    pub fn reset() -> Self {
        Self {
            user: Some(None),
            is_authenticated: Some(false),
            token: Some(None),
            refresh_token: Some(None),
            last_login_time: Some(None),
        }
    }

    pub fn apply(self, target: &mut AuthState) {
        merge_opaque(&mut target.user, self.user);
        if let Some(v) = self.is_authenticated {
            target.is_authenticated = v;
        }
        if let Some(v) = self.token {
            target.token = v;
        }
        if let Some(v) = self.refresh_token {
            target.refresh_token = v;
        }
        if let Some(v) = self.last_login_time {
            target.last_login_time = v;
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UiPatch {
    pub theme: Option<Theme>,
    pub language: Option<Language>,
    pub primary_color: Option<String>,
    pub sidebar_collapsed: Option<bool>,
    pub notifications: Option<Vec<Notification>>,
}

impl UiPatch {
    pub fn apply(self, target: &mut UiState) {
        if let Some(v) = self.theme {
            target.theme = v;
        }
        if let Some(v) = self.language {
            target.language = v;
        }
        if let Some(v) = self.primary_color {
            target.primary_color = v;
        }
        if let Some(v) = self.sidebar_collapsed {
            target.sidebar_collapsed = v;
        }
        if let Some(v) = self.notifications {
            target.notifications = v;
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NavigationPatch {
    pub current_route: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub active_module: Option<Option<String>>,
    pub breadcrumbs: Option<Vec<Breadcrumb>>,
    pub last_visited_routes: Option<Vec<String>>,
}

impl NavigationPatch {
    pub fn apply(self, target: &mut NavigationState) {
        if let Some(v) = self.current_route {
            target.current_route = v;
        }
        if let Some(v) = self.active_module {
            target.active_module = v;
        }
        if let Some(v) = self.breadcrumbs {
            target.breadcrumbs = v;
        }
        if let Some(v) = self.last_visited_routes {
            target.last_visited_routes = normalize_routes(v);
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct BusinessPatch {
    #[serde(default, deserialize_with = "nullable")]
    pub selected_artist: Option<Option<Value>>,
    #[serde(default, deserialize_with = "nullable")]
    pub selected_club: Option<Option<Value>>,
    #[serde(default, deserialize_with = "nullable")]
    pub monetization_context: Option<Option<Value>>,
    pub shared_content: Option<Vec<Value>>,
}

impl BusinessPatch {
    pub fn apply(self, target: &mut BusinessState) {
        merge_opaque(&mut target.selected_artist, self.selected_artist);
        merge_opaque(&mut target.selected_club, self.selected_club);
        merge_opaque(&mut target.monetization_context, self.monetization_context);
        if let Some(v) = self.shared_content {
            target.shared_content = v;
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SystemPatch {
    pub online_status: Option<bool>,
    #[serde(default, deserialize_with = "nullable")]
    pub last_sync_time: Option<Option<DateTime<Utc>>>,
    pub pending_actions: Option<Vec<Value>>,
    pub error_queue: Option<Vec<SystemErrorEntry>>,
}

impl SystemPatch {
    pub fn apply(self, target: &mut SystemState) {
        if let Some(v) = self.online_status {
            target.online_status = v;
        }
        if let Some(v) = self.last_sync_time {
            target.last_sync_time = v;
        }
        if let Some(v) = self.pending_actions {
            target.pending_actions = v;
        }
        if let Some(v) = self.error_queue {
            target.error_queue = v;
        }
    }
}

// =============================================================================
// Slice Trait
// =============================================================================

/// Ties a slice struct to its key and patch type for the typed store API.
pub trait Slice: Clone + Send + Sync + 'static {
    const KEY: SliceKey;
    type Patch: Default + Clone + Send + Into<SlicePatch> + 'static;

    fn select(state: &GlobalState) -> &Self;
    fn select_mut(state: &mut GlobalState) -> &mut Self;
    fn apply(&mut self, patch: Self::Patch);
    fn wrap(self) -> SliceState;
    fn from_state(slice: &SliceState) -> Option<&Self>;
}

macro_rules! impl_slice {
    ($state:ty, $patch:ty, $key:ident, $field:ident) => {
        impl Slice for $state {
            const KEY: SliceKey = SliceKey::$key;
            type Patch = $patch;

            fn select(state: &GlobalState) -> &Self {
                &state.$field
            }

            fn select_mut(state: &mut GlobalState) -> &mut Self {
                &mut state.$field
            }

            fn apply(&mut self, patch: Self::Patch) {
                patch.apply(self)
            }

            fn wrap(self) -> SliceState {
                SliceState::$key(self)
            }

            fn from_state(slice: &SliceState) -> Option<&Self> {
                match slice {
                    SliceState::$key(s) => Some(s),
                    _ => None,
                }
            }
        }

        impl From<$patch> for SlicePatch {
            fn from(patch: $patch) -> Self {
                SlicePatch::$key(patch)
            }
        }
    };
}

impl_slice!(AuthState, AuthPatch, Auth, auth);
impl_slice!(UiState, UiPatch, Ui, ui);
impl_slice!(NavigationState, NavigationPatch, Navigation, navigation);
impl_slice!(BusinessState, BusinessPatch, Business, business);
impl_slice!(SystemState, SystemPatch, System, system);

// =============================================================================
// Dynamic Patch
// =============================================================================

/// A patch for any slice, used by `set_batch` and the string-keyed surface.
#[derive(Debug, Clone, PartialEq)]
pub enum SlicePatch {
    Auth(AuthPatch),
    Ui(UiPatch),
    Navigation(NavigationPatch),
    Business(BusinessPatch),
    System(SystemPatch),
}

impl SlicePatch {
    pub fn key(&self) -> SliceKey {
        match self {
            SlicePatch::Auth(_) => SliceKey::Auth,
            SlicePatch::Ui(_) => SliceKey::Ui,
            SlicePatch::Navigation(_) => SliceKey::Navigation,
            SlicePatch::Business(_) => SliceKey::Business,
            SlicePatch::System(_) => SliceKey::System,
        }
    }

    /// Parses a JSON partial update. `null` is an empty patch.
    pub fn from_json(key: SliceKey, value: Value) -> CoreResult<Self> {
        if value.is_null() {
            return Ok(Self::empty(key));
        }
        let invalid = |e: serde_json::Error| CoreError::InvalidPatch {
            slice: key,
            reason: e.to_string(),
        };
        let patch = match key {
            SliceKey::Auth => SlicePatch::Auth(serde_json::from_value(value).map_err(invalid)?),
            SliceKey::Ui => SlicePatch::Ui(serde_json::from_value(value).map_err(invalid)?),
            SliceKey::Navigation => {
                SlicePatch::Navigation(serde_json::from_value(value).map_err(invalid)?)
            }
            SliceKey::Business => {
                SlicePatch::Business(serde_json::from_value(value).map_err(invalid)?)
            }
            SliceKey::System => SlicePatch::System(serde_json::from_value(value).map_err(invalid)?),
        };
        Ok(patch)
    }

    pub fn empty(key: SliceKey) -> Self {
        match key {
            SliceKey::Auth => SlicePatch::Auth(AuthPatch::default()),
            SliceKey::Ui => SlicePatch::Ui(UiPatch::default()),
            SliceKey::Navigation => SlicePatch::Navigation(NavigationPatch::default()),
            SliceKey::Business => SlicePatch::Business(BusinessPatch::default()),
            SliceKey::System => SlicePatch::System(SystemPatch::default()),
        }
    }

    pub fn apply_to(self, state: &mut GlobalState) {
        match self {
            SlicePatch::Auth(p) => p.apply(&mut state.auth),
            SlicePatch::Ui(p) => p.apply(&mut state.ui),
            SlicePatch::Navigation(p) => p.apply(&mut state.navigation),
            SlicePatch::Business(p) => p.apply(&mut state.business),
            SlicePatch::System(p) => p.apply(&mut state.system),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
