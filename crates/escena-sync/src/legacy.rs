//! # Legacy Migration Bridge
//!
//! Imports the flat keys older consumers wrote straight into durable storage,
//! and keeps those keys fresh while such consumers are still on the page.
//!
//! ## Key Mapping
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Legacy Keys                                     │
//! │                                                                         │
//! │  flat key          raw format                 slice field               │
//! │  ────────          ──────────                 ───────────               │
//! │  user              JSON object                auth.user                 │
//! │  isAuthenticated   "true" | "false"           auth.isAuthenticated      │
//! │  theme             dark | "dark"              ui.theme                  │
//! │  language          en | "en"                  ui.language               │
//! │  recentRoutes      JSON array of strings      navigation.lastVisited... │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Per-Key State Machine
//! ```text
//!   NotPresent                       (key absent, nothing to do)
//!
//!   Pending ──parse ok──▶ Migrated ──key removed──▶ Retired
//!      │
//!      └──parse error──▶ Failed      (key left in place; run continues)
//! ```
//!
//! A run that leaves no key `Failed` writes `<prefix>_legacy_migrated`, and
//! later startups skip the scan. A `Failed` key is retried on the next
//! startup only.
//!
//! ## Transitional Mirror
//! [`LegacyMirror`] listens to `auth`, `ui` and `navigation` and writes the
//! flat keys back. It never writes to the store, so no update loop can form.
//! Values legacy consumers write later are picked up by an explicit
//! [`LegacyBridge::import_pending`].

use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use escena_core::{
    AuthPatch, Language, NavigationPatch, SliceKey, SlicePatch, SliceState, Theme, UiPatch,
};
use escena_storage::StorageBackend;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::error::{StoreError, StoreResult};
use crate::registry::Subscription;
use crate::store::Store;

// =============================================================================
// Legacy Keys
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LegacyKey {
    User,
    IsAuthenticated,
    Theme,
    Language,
    RecentRoutes,
}

impl LegacyKey {
    pub const ALL: [LegacyKey; 5] = [
        LegacyKey::User,
        LegacyKey::IsAuthenticated,
        LegacyKey::Theme,
        LegacyKey::Language,
        LegacyKey::RecentRoutes,
    ];

    /// The flat storage key.
    pub fn as_str(&self) -> &'static str {
        match self {
            LegacyKey::User => "user",
            LegacyKey::IsAuthenticated => "isAuthenticated",
            LegacyKey::Theme => "theme",
            LegacyKey::Language => "language",
            LegacyKey::RecentRoutes => "recentRoutes",
        }
    }

    pub fn slice(&self) -> SliceKey {
        match self {
            LegacyKey::User | LegacyKey::IsAuthenticated => SliceKey::Auth,
            LegacyKey::Theme | LegacyKey::Language => SliceKey::Ui,
            LegacyKey::RecentRoutes => SliceKey::Navigation,
        }
    }

    /// Turns a raw legacy value into a patch for its slice.
    pub fn parse(&self, raw: &str) -> StoreResult<SlicePatch> {
        let fail = |reason: String| StoreError::MigrationParse {
            key: self.as_str().to_string(),
            reason,
        };
        let patch = match self {
            LegacyKey::User => {
                let user: Value = serde_json::from_str(raw).map_err(|e| fail(e.to_string()))?;
                if !user.is_object() {
                    return Err(fail("expected a JSON object".into()));
                }
                SlicePatch::Auth(AuthPatch {
                    user: Some(Some(user)),
                    ..Default::default()
                })
            }
            LegacyKey::IsAuthenticated => {
                let flag = match unquote(raw).as_str() {
                    "true" => true,
                    "false" => false,
                    other => return Err(fail(format!("expected true/false, got '{}'", other))),
                };
                SlicePatch::Auth(AuthPatch {
                    is_authenticated: Some(flag),
                    ..Default::default()
                })
            }
            LegacyKey::Theme => {
                let theme: Theme = unquote(raw).parse().map_err(fail)?;
                SlicePatch::Ui(UiPatch {
                    theme: Some(theme),
                    ..Default::default()
                })
            }
            LegacyKey::Language => {
                let language: Language = unquote(raw).parse().map_err(fail)?;
                SlicePatch::Ui(UiPatch {
                    language: Some(language),
                    ..Default::default()
                })
            }
            LegacyKey::RecentRoutes => {
                let routes: Vec<String> =
                    serde_json::from_str(raw).map_err(|e| fail(e.to_string()))?;
                SlicePatch::Navigation(NavigationPatch {
                    last_visited_routes: Some(routes),
                    ..Default::default()
                })
            }
        };
        Ok(patch)
    }

    /// Flat value a legacy consumer expects, or None to remove the key.
    pub fn render(&self, slice: &SliceState) -> Option<String> {
        match (self, slice) {
            (LegacyKey::User, SliceState::Auth(auth)) => {
                auth.user.as_ref().map(|user| user.to_string())
            }
            (LegacyKey::IsAuthenticated, SliceState::Auth(auth)) => {
                Some(auth.is_authenticated.to_string())
            }
            (LegacyKey::Theme, SliceState::Ui(ui)) => Some(ui.theme.as_str().to_string()),
            (LegacyKey::Language, SliceState::Ui(ui)) => Some(ui.language.as_str().to_string()),
            (LegacyKey::RecentRoutes, SliceState::Navigation(nav)) => {
                serde_json::to_string(&nav.last_visited_routes).ok()
            }
            _ => None,
        }
    }

    fn for_slice(key: SliceKey) -> impl Iterator<Item = LegacyKey> {
        LegacyKey::ALL.into_iter().filter(move |k| k.slice() == key)
    }
}

impl fmt::Display for LegacyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Strips one level of JSON string quoting, if present.
fn unquote(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.starts_with('"') {
        if let Ok(inner) = serde_json::from_str::<String>(trimmed) {
            return inner;
        }
    }
    trimmed.to_string()
}

// =============================================================================
// Migration State
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationState {
    /// Found, not yet applied.
    Pending,
    /// Applied to the store; the flat key could not be removed.
    Migrated,
    /// Applied and removed.
    Retired,
    /// Could not be parsed or read; left in place.
    Failed,
    /// Nothing stored under this key.
    NotPresent,
}

impl fmt::Display for MigrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MigrationState::Pending => write!(f, "pending"),
            MigrationState::Migrated => write!(f, "migrated"),
            MigrationState::Retired => write!(f, "retired"),
            MigrationState::Failed => write!(f, "failed"),
            MigrationState::NotPresent => write!(f, "not_present"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    /// True when the completion marker short-circuited the run.
    pub skipped: bool,
    pub outcomes: Vec<(LegacyKey, MigrationState)>,
}

impl MigrationReport {
    pub fn state_of(&self, key: LegacyKey) -> Option<MigrationState> {
        self.outcomes
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, state)| *state)
    }

    /// Keys whose value reached the store.
    pub fn applied(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, s)| matches!(s, MigrationState::Migrated | MigrationState::Retired))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, s)| *s == MigrationState::Failed)
            .count()
    }
}

// =============================================================================
// Bridge
// =============================================================================

pub struct LegacyBridge {
    prefix: String,
    storage: Arc<dyn StorageBackend>,
}

impl LegacyBridge {
    pub fn new(prefix: &str, storage: Arc<dyn StorageBackend>) -> Self {
        Self {
            prefix: prefix.to_string(),
            storage,
        }
    }

    pub fn marker_key(&self) -> String {
        format!("{}_legacy_migrated", self.prefix)
    }

    pub fn is_completed(&self) -> bool {
        matches!(self.storage.get(&self.marker_key()), Ok(Some(_)))
    }

    /// One-shot startup migration, skipped once the marker exists.
    pub fn run(&self, store: &Store) -> MigrationReport {
        if self.is_completed() {
            debug!("Legacy migration already completed");
            return MigrationReport {
                skipped: true,
                outcomes: Vec::new(),
            };
        }

        let report = self.import_pending(store);

        if report.failed() == 0 {
            let stamp = Utc::now().to_rfc3339();
            if let Err(e) = self.storage.save(&self.marker_key(), &stamp) {
                warn!(error = %e, "Could not record legacy migration marker");
            }
        }
        if report.applied() > 0 || report.failed() > 0 {
            info!(
                applied = report.applied(),
                failed = report.failed(),
                "Legacy migration ran"
            );
        }
        report
    }

    /// Reports which legacy keys are present without touching anything.
    pub fn scan(&self) -> MigrationReport {
        let outcomes = LegacyKey::ALL
            .into_iter()
            .map(|key| {
                let state = match self.storage.get(key.as_str()) {
                    Ok(Some(_)) => MigrationState::Pending,
                    Ok(None) => MigrationState::NotPresent,
                    Err(_) => MigrationState::Failed,
                };
                (key, state)
            })
            .collect();
        MigrationReport {
            skipped: false,
            outcomes,
        }
    }

    /// Removes every flat legacy key. Returns how many were present.
    pub fn clear_keys(&self) -> StoreResult<usize> {
        let mut removed = 0;
        for key in LegacyKey::ALL {
            if self.storage.get(key.as_str())?.is_some() {
                self.storage.remove(key.as_str())?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Imports every legacy key currently present, ignoring the marker.
    pub fn import_pending(&self, store: &Store) -> MigrationReport {
        let outcomes = LegacyKey::ALL
            .into_iter()
            .map(|key| (key, self.migrate_key(store, key)))
            .collect();
        MigrationReport {
            skipped: false,
            outcomes,
        }
    }

    fn migrate_key(&self, store: &Store, key: LegacyKey) -> MigrationState {
        let raw = match self.storage.get(key.as_str()) {
            Ok(Some(raw)) => raw,
            Ok(None) => return MigrationState::NotPresent,
            Err(e) => {
                warn!(legacy_key = %key, error = %e, "Could not read legacy key");
                return MigrationState::Failed;
            }
        };

        let patch = match key.parse(&raw) {
            Ok(patch) => patch,
            Err(e) => {
                error!(legacy_key = %key, error = %e, "Legacy value left in place");
                return MigrationState::Failed;
            }
        };
        store.set_patch(patch);

        let state = match self.storage.remove(key.as_str()) {
            Ok(()) => MigrationState::Retired,
            Err(e) => {
                warn!(legacy_key = %key, error = %e, "Could not retire legacy key");
                MigrationState::Migrated
            }
        };
        debug!(legacy_key = %key, %state, "Legacy key migrated");
        state
    }
}

// =============================================================================
// Transitional Mirror
// =============================================================================

/// Writes slice changes back to the flat legacy keys.
///
/// Keys the startup run left `Failed` are held: the mirror never touches
/// them, so the unparsed value survives for recovery.
#[derive(Debug)]
pub struct LegacyMirror {
    subscriptions: Vec<Subscription>,
    held: Vec<LegacyKey>,
}

impl LegacyMirror {
    pub fn attach(
        store: &Store,
        storage: Arc<dyn StorageBackend>,
        report: &MigrationReport,
    ) -> Self {
        let held: Vec<LegacyKey> = report
            .outcomes
            .iter()
            .filter(|(_, state)| *state == MigrationState::Failed)
            .map(|(key, _)| *key)
            .collect();
        if !held.is_empty() {
            warn!(?held, "Legacy keys held back from the mirror");
        }

        let subscriptions = [SliceKey::Auth, SliceKey::Ui, SliceKey::Navigation]
            .into_iter()
            .map(|slice| {
                let storage = Arc::clone(&storage);
                let keys: Vec<LegacyKey> = LegacyKey::for_slice(slice)
                    .into_iter()
                    .filter(|key| !held.contains(key))
                    .collect();
                store.subscribe_slice(slice, move |change| {
                    for &key in &keys {
                        mirror_key(storage.as_ref(), key, &change.new);
                    }
                    Ok(())
                })
            })
            .collect();
        Self {
            subscriptions,
            held,
        }
    }

    /// Keys the mirror leaves alone.
    pub fn held(&self) -> &[LegacyKey] {
        &self.held
    }

    pub fn detach(&self) {
        for sub in &self.subscriptions {
            sub.unsubscribe();
        }
    }
}

fn mirror_key(storage: &dyn StorageBackend, key: LegacyKey, slice: &SliceState) {
    let result = match key.render(slice) {
        Some(value) => storage.save(key.as_str(), &value),
        None => storage.remove(key.as_str()),
    };
    if let Err(e) = result {
        warn!(legacy_key = %key, error = %e, "Could not mirror legacy key");
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::testing::{store_on, store_on_with};
    use escena_core::{AuthState, NavigationState, UiState};
    use escena_storage::MemoryBackend;
    use serde_json::json;
    use std::time::Duration;

    fn no_mirror() -> StoreConfig {
        StoreConfig::default().legacy_mirror(false)
    }

    #[test]
    fn test_parse_rules() {
        assert!(matches!(
            LegacyKey::Theme.parse("\"dark\"").unwrap(),
            SlicePatch::Ui(UiPatch { theme: Some(Theme::Dark), .. })
        ));
        assert!(matches!(
            LegacyKey::Language.parse("en").unwrap(),
            SlicePatch::Ui(UiPatch { language: Some(Language::En), .. })
        ));
        assert!(LegacyKey::IsAuthenticated.parse("yes").is_err());
        assert!(LegacyKey::User.parse("[1,2]").is_err());
        assert!(matches!(
            LegacyKey::RecentRoutes.parse("not json"),
            Err(StoreError::MigrationParse { .. })
        ));
    }

    #[test]
    fn test_migration_runs_once() {
        let storage = MemoryBackend::with_entries([
            ("user", r#"{"id":"u1","name":"Ana"}"#),
            ("isAuthenticated", "true"),
            ("theme", "dark"),
            ("recentRoutes", r#"["/a","/b","/a"]"#),
        ]);

        let (store, _timers) = store_on_with(storage.clone(), no_mirror()).unwrap();
        let auth = store.slice::<AuthState>();
        assert!(auth.is_authenticated);
        assert_eq!(auth.user, Some(json!({"id": "u1", "name": "Ana"})));
        assert_eq!(store.slice::<UiState>().theme, Theme::Dark);
        assert_eq!(
            store.slice::<NavigationState>().last_visited_routes,
            vec!["/a", "/b"]
        );
        for key in ["user", "isAuthenticated", "theme", "recentRoutes"] {
            assert_eq!(storage.get(key).unwrap(), None, "{} not retired", key);
        }
        assert!(storage.get("escena_legacy_migrated").unwrap().is_some());
        store.destroy();

        storage.save("isAuthenticated", "false").unwrap();
        let (second, _timers) = store_on_with(storage.clone(), no_mirror()).unwrap();
        assert_eq!(storage.get("isAuthenticated").unwrap().as_deref(), Some("false"));
        let report = LegacyBridge::new("escena", Arc::new(storage.clone())).run(&second);
        assert!(report.skipped);
    }

    #[test]
    fn test_migration_runs_once_with_mirror() {
        let storage = MemoryBackend::with_entries([
            ("user", r#"{"id":"u1","name":"Ana"}"#),
            ("isAuthenticated", "true"),
            ("theme", "dark"),
        ]);
        let (store, timers) = store_on(storage.clone());
        timers.advance(Duration::from_millis(16));
        assert!(storage.get("escena_legacy_migrated").unwrap().is_some());
        assert_eq!(storage.get("isAuthenticated").unwrap().as_deref(), Some("true"));
        assert_eq!(storage.get("theme").unwrap().as_deref(), Some("dark"));
        store.destroy();

        storage.save("isAuthenticated", "false").unwrap();
        let (second, _timers) = store_on(storage.clone());
        assert!(second.slice::<AuthState>().is_authenticated);
        assert_eq!(storage.get("isAuthenticated").unwrap().as_deref(), Some("false"));
        let report = LegacyBridge::new("escena", Arc::new(storage.clone())).run(&second);
        assert!(report.skipped);
    }

    #[test]
    fn test_failed_key_survives_mirror() {
        let storage = MemoryBackend::with_entries([
            ("user", "{bad json"),
            ("isAuthenticated", "true"),
        ]);
        let (store, timers) = store_on(storage.clone());
        assert!(store.slice::<AuthState>().is_authenticated);
        assert_eq!(store.slice::<AuthState>().user, None);

        timers.advance(Duration::from_millis(16));
        assert_eq!(storage.get("user").unwrap().as_deref(), Some("{bad json"));
        assert_eq!(storage.get("isAuthenticated").unwrap().as_deref(), Some("true"));

        store.login(json!({"id": "u2"}), "tok", None);
        store.logout();
        timers.advance(Duration::from_millis(16));
        assert_eq!(storage.get("user").unwrap().as_deref(), Some("{bad json"));
        assert_eq!(storage.get("isAuthenticated").unwrap().as_deref(), Some("false"));
        assert_eq!(storage.get("escena_legacy_migrated").unwrap(), None);
    }

    #[test]
    fn test_malformed_value_stays_in_place() {
        let storage = MemoryBackend::with_entries([("theme", "neon"), ("language", "ca")]);
        let (store, _timers) = store_on_with(storage.clone(), no_mirror()).unwrap();

        assert_eq!(store.slice::<UiState>().theme, Theme::Light);
        assert_eq!(store.slice::<UiState>().language, Language::Ca);
        assert_eq!(storage.get("theme").unwrap().as_deref(), Some("neon"));
        assert_eq!(storage.get("language").unwrap(), None);
        assert_eq!(storage.get("escena_legacy_migrated").unwrap(), None);
    }

    #[test]
    fn test_report_states() {
        let storage = MemoryBackend::with_entries([("theme", "auto"), ("language", "xx")]);
        let (store, _timers) =
            store_on_with(storage.clone(), no_mirror().migrate_legacy(false)).unwrap();
        let report = LegacyBridge::new("escena", Arc::new(storage)).run(&store);
        assert_eq!(report.state_of(LegacyKey::Theme), Some(MigrationState::Retired));
        assert_eq!(report.state_of(LegacyKey::Language), Some(MigrationState::Failed));
        assert_eq!(report.state_of(LegacyKey::User), Some(MigrationState::NotPresent));
        assert_eq!(report.applied(), 1);
        assert_eq!(report.failed(), 1);
    }

    #[test]
    fn test_mirror_writes_legacy_keys() {
        let storage = MemoryBackend::new();
        let (store, timers) = store_on(storage.clone());

        store.login(json!({"id": "u1", "name": "Ana"}), "tok123", None);
        store.set_theme(Theme::Dark);
        store.navigate_to("/clubs", None);
        timers.advance(Duration::from_millis(16));

        assert_eq!(storage.get("isAuthenticated").unwrap().as_deref(), Some("true"));
        assert_eq!(storage.get("theme").unwrap().as_deref(), Some("dark"));
        assert_eq!(storage.get("recentRoutes").unwrap().as_deref(), Some(r#"["/clubs"]"#));
        let user: Value = serde_json::from_str(&storage.get("user").unwrap().unwrap()).unwrap();
        assert_eq!(user["name"], json!("Ana"));

        store.logout();
        timers.advance(Duration::from_millis(16));
        assert_eq!(storage.get("user").unwrap(), None);
        assert_eq!(storage.get("isAuthenticated").unwrap().as_deref(), Some("false"));

        assert!(store.detach_legacy_mirror());
        store.set_theme(Theme::Auto);
        timers.advance(Duration::from_millis(16));
        assert_eq!(storage.get("theme").unwrap().as_deref(), Some("dark"));
    }

    #[test]
    fn test_import_pending_picks_up_late_writes() {
        let storage = MemoryBackend::new();
        let (store, _timers) = store_on_with(storage.clone(), no_mirror()).unwrap();

        storage.save("language", "\"en\"").unwrap();
        let report = store.import_legacy();
        assert_eq!(report.state_of(LegacyKey::Language), Some(MigrationState::Retired));
        assert_eq!(store.slice::<UiState>().language, Language::En);

        let bridge = LegacyBridge::new("escena", Arc::new(storage.clone()));
        assert_eq!(bridge.scan().state_of(LegacyKey::Language), Some(MigrationState::NotPresent));
        storage.save("theme", "dark").unwrap();
        assert_eq!(bridge.scan().state_of(LegacyKey::Theme), Some(MigrationState::Pending));
    }
}
