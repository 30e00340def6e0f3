//! # Domain Types
//!
//! The fixed-shape state tree shared by every UI module on the page.
//!
//! ## State Tree
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           GlobalState                                   │
//! │                                                                         │
//! │  auth ─────────── user, isAuthenticated, token, refreshToken,          │
//! │                   lastLoginTime                                         │
//! │  ui ───────────── theme, language, primaryColor, sidebarCollapsed,     │
//! │                   notifications[]                                       │
//! │  navigation ───── currentRoute, activeModule, breadcrumbs[],           │
//! │                   lastVisitedRoutes[] (unique, newest first, max 10)    │
//! │  business ─────── selectedArtist, selectedClub, monetizationContext,   │
//! │                   sharedContent[]   (free-form cross-module payloads)   │
//! │  system ───────── onlineStatus, lastSyncTime, pendingActions[],        │
//! │                   errorQueue[]                                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Serialization
//! Field names are camelCase on the wire so the persisted JSON and the
//! generated TypeScript match what the UI modules already read.
//! Free-form payloads are `serde_json::Value`.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use ts_rs::TS;
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};
use crate::MAX_VISITED_ROUTES;

// =============================================================================
// Slice Keys
// =============================================================================

/// Names one top-level slice of the state tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum SliceKey {
    Auth,
    Ui,
    Navigation,
    Business,
    System,
}

impl SliceKey {
    /// Every slice, in tree order.
    pub const ALL: [SliceKey; 5] = [
        SliceKey::Auth,
        SliceKey::Ui,
        SliceKey::Navigation,
        SliceKey::Business,
        SliceKey::System,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SliceKey::Auth => "auth",
            SliceKey::Ui => "ui",
            SliceKey::Navigation => "navigation",
            SliceKey::Business => "business",
            SliceKey::System => "system",
        }
    }
}

impl fmt::Display for SliceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SliceKey {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SliceKey::ALL
            .into_iter()
            .find(|key| key.as_str() == s)
            .ok_or_else(|| CoreError::InvalidSlice(s.to_string()))
    }
}

// =============================================================================
// Global State
// =============================================================================

/// The whole shared tree. Built from defaults on first access.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct GlobalState {
    pub auth: AuthState,
    pub ui: UiState,
    pub navigation: NavigationState,
    pub business: BusinessState,
    pub system: SystemState,
}

impl GlobalState {
    /// Clones one slice out of the tree.
    pub fn slice(&self, key: SliceKey) -> SliceState {
        match key {
            SliceKey::Auth => SliceState::Auth(self.auth.clone()),
            SliceKey::Ui => SliceState::Ui(self.ui.clone()),
            SliceKey::Navigation => SliceState::Navigation(self.navigation.clone()),
            SliceKey::Business => SliceState::Business(self.business.clone()),
            SliceKey::System => SliceState::System(self.system.clone()),
        }
    }

    /// Swaps a whole slice in place.
    pub fn replace_slice(&mut self, slice: SliceState) {
        match slice {
            SliceState::Auth(s) => self.auth = s,
            SliceState::Ui(s) => self.ui = s,
            SliceState::Navigation(s) => self.navigation = s,
            SliceState::Business(s) => self.business = s,
            SliceState::System(s) => self.system = s,
        }
    }
}

// =============================================================================
// Auth
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthState {
    /// Opaque user profile from the identity backend.
    #[ts(type = "unknown")]
    pub user: Option<Value>,
    pub is_authenticated: bool,
    pub token: Option<String>,
    pub refresh_token: Option<String>,
    #[ts(as = "Option<String>")]
    pub last_login_time: Option<DateTime<Utc>>,
}

// =============================================================================
// UI
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
    Auto,
}

impl Theme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Theme::Light => "light",
            Theme::Dark => "dark",
            Theme::Auto => "auto",
        }
    }
}

impl FromStr for Theme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "light" => Ok(Theme::Light),
            "dark" => Ok(Theme::Dark),
            "auto" => Ok(Theme::Auto),
            other => Err(format!("unknown theme '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    Es,
    En,
    Ca,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Es => "es",
            Language::En => "en",
            Language::Ca => "ca",
        }
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "es" => Ok(Language::Es),
            "en" => Ok(Language::En),
            "ca" => Ok(Language::Ca),
            other => Err(format!("unknown language '{}'", other)),
        }
    }
}

pub const DEFAULT_PRIMARY_COLOR: &str = "#6d28d9";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase", default)]
pub struct UiState {
    pub theme: Theme,
    pub language: Language,
    pub primary_color: String,
    pub sidebar_collapsed: bool,
    /// Insertion order.
    pub notifications: Vec<Notification>,
}

impl Default for UiState {
    fn default() -> Self {
        Self {
            theme: Theme::default(),
            language: Language::default(),
            primary_color: DEFAULT_PRIMARY_COLOR.to_string(),
            sidebar_collapsed: false,
            notifications: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum NotificationType {
    Info,
    Success,
    Warning,
    Error,
}

/// A user-facing notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub title: String,
    pub message: String,
    #[ts(as = "String")]
    pub timestamp: DateTime<Utc>,
    pub read: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub actions: Option<Vec<NotificationAction>>,
}

/// A button on a notification. Only the label survives serialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NotificationAction {
    pub label: String,
    #[serde(skip)]
    #[ts(skip)]
    pub callback: Option<ActionCallback>,
}

impl NotificationAction {
    pub fn new(label: impl Into<String>, callback: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            label: label.into(),
            callback: Some(ActionCallback(Arc::new(callback))),
        }
    }

    /// Runs the callback, if it is still attached.
    pub fn invoke(&self) {
        if let Some(cb) = &self.callback {
            (cb.0)();
        }
    }
}

/// In-process closure behind a notification action.
#[derive(Clone)]
pub struct ActionCallback(pub Arc<dyn Fn() + Send + Sync>);

impl fmt::Debug for ActionCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ActionCallback(..)")
    }
}

impl PartialEq for ActionCallback {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// Input for `add_notification`: id, timestamp and read flag are assigned.
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub kind: NotificationType,
    pub title: String,
    pub message: String,
    pub actions: Option<Vec<NotificationAction>>,
}

impl NewNotification {
    pub fn new(kind: NotificationType, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            title: title.into(),
            message: message.into(),
            actions: None,
        }
    }

    pub fn with_action(mut self, action: NotificationAction) -> Self {
        self.actions.get_or_insert_with(Vec::new).push(action);
        self
    }

    pub fn into_notification(self) -> Notification {
        Notification {
            id: Uuid::new_v4().to_string(),
            kind: self.kind,
            title: self.title,
            message: self.message,
            timestamp: Utc::now(),
            read: false,
            actions: self.actions,
        }
    }
}

// =============================================================================
// Navigation
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Breadcrumb {
    pub label: String,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase", default)]
pub struct NavigationState {
    pub current_route: String,
    pub active_module: Option<String>,
    pub breadcrumbs: Vec<Breadcrumb>,
    /// Unique, newest first, at most [`MAX_VISITED_ROUTES`].
    pub last_visited_routes: Vec<String>,
}

impl Default for NavigationState {
    fn default() -> Self {
        Self {
            current_route: "/".to_string(),
            active_module: None,
            breadcrumbs: Vec::new(),
            last_visited_routes: Vec::new(),
        }
    }
}

impl NavigationState {
    /// History after visiting `route`: moved to the front, deduplicated, capped.
    pub fn routes_after_visit(&self, route: &str) -> Vec<String> {
        let mut routes = Vec::with_capacity(self.last_visited_routes.len() + 1);
        routes.push(route.to_string());
        routes.extend(self.last_visited_routes.iter().cloned());
        normalize_routes(routes)
    }
}

/// Drops later duplicates and caps the list at [`MAX_VISITED_ROUTES`].
pub fn normalize_routes(routes: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(routes.len().min(MAX_VISITED_ROUTES));
    for route in routes {
        if out.len() == MAX_VISITED_ROUTES {
            break;
        }
        if !out.contains(&route) {
            out.push(route);
        }
    }
    out
}

// =============================================================================
// Business
// =============================================================================

/// Cross-module context. Every field is free-form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase", default)]
pub struct BusinessState {
    #[ts(type = "unknown")]
    pub selected_artist: Option<Value>,
    #[ts(type = "unknown")]
    pub selected_club: Option<Value>,
    #[ts(type = "unknown")]
    pub monetization_context: Option<Value>,
    #[ts(type = "Array<unknown>")]
    pub shared_content: Vec<Value>,
}

// =============================================================================
// System
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SystemErrorEntry {
    pub message: String,
    #[ts(as = "String")]
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase", default)]
pub struct SystemState {
    pub online_status: bool,
    #[ts(as = "Option<String>")]
    pub last_sync_time: Option<DateTime<Utc>>,
    #[ts(type = "Array<unknown>")]
    pub pending_actions: Vec<Value>,
    pub error_queue: Vec<SystemErrorEntry>,
}

impl Default for SystemState {
    fn default() -> Self {
        Self {
            online_status: true,
            last_sync_time: None,
            pending_actions: Vec::new(),
            error_queue: Vec::new(),
        }
    }
}

// =============================================================================
// Dynamic Slice Values
// =============================================================================

/// One slice, for the string-keyed surface (`get("ui")`, listeners on `"*"`).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SliceState {
    Auth(AuthState),
    Ui(UiState),
    Navigation(NavigationState),
    Business(BusinessState),
    System(SystemState),
}

impl SliceState {
    pub fn key(&self) -> SliceKey {
        match self {
            SliceState::Auth(_) => SliceKey::Auth,
            SliceState::Ui(_) => SliceKey::Ui,
            SliceState::Navigation(_) => SliceKey::Navigation,
            SliceState::Business(_) => SliceKey::Business,
            SliceState::System(_) => SliceKey::System,
        }
    }

    pub fn to_json(&self) -> CoreResult<Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Parses a full slice snapshot. Missing fields take their defaults.
    pub fn from_json(key: SliceKey, value: Value) -> CoreResult<Self> {
        let slice = match key {
            SliceKey::Auth => SliceState::Auth(serde_json::from_value(value)?),
            SliceKey::Ui => SliceState::Ui(serde_json::from_value(value)?),
            SliceKey::Navigation => SliceState::Navigation(serde_json::from_value(value)?),
            SliceKey::Business => SliceState::Business(serde_json::from_value(value)?),
            SliceKey::System => SliceState::System(serde_json::from_value(value)?),
        };
        Ok(slice)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
