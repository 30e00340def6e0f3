//! # Store Actions
//!
//! Named operations consumer modules call instead of hand-building patches.
//!
//! ```text
//! ┌──────────────────────┬──────────┬──────────────────────────────────────┐
//! │ Action               │ Slice    │ Effect                               │
//! ├──────────────────────┼──────────┼──────────────────────────────────────┤
//! │ login / logout       │ auth, ui │ reset auth, set session, greet       │
//! │ set_theme / language │ ui       │ replace one field                    │
//! │ toggle_sidebar       │ ui       │ flip sidebarCollapsed                │
//! │ *_notification       │ ui       │ append / mark read / remove / clear  │
//! │ navigate_to          │ nav      │ route, module, visited history       │
//! │ set_breadcrumbs      │ nav      │ replace trail                        │
//! │ set_business_context │ business │ replace one context field            │
//! │ share_content        │ business │ append to sharedContent              │
//! └──────────────────────┴──────────┴──────────────────────────────────────┘
//! ```

use chrono::Utc;
use escena_core::{
    AuthPatch, Breadcrumb, BusinessState, Language, NavigationPatch, NavigationState,
    NewNotification, NotificationType, SlicePatch, Theme, UiPatch, UiState,
};
use serde_json::Value;
use tracing::{debug, info};

use crate::store::Store;

/// Free-form fields of the business slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusinessField {
    SelectedArtist,
    SelectedClub,
    MonetizationContext,
}

impl BusinessField {
    fn slot(self, business: &mut BusinessState) -> &mut Option<Value> {
        match self {
            BusinessField::SelectedArtist => &mut business.selected_artist,
            BusinessField::SelectedClub => &mut business.selected_club,
            BusinessField::MonetizationContext => &mut business.monetization_context,
        }
    }
}

/// Name used in the login greeting: `name`, then `email`, then "usuario".
fn display_name(user: &Value) -> &str {
    ["name", "email"]
        .iter()
        .find_map(|field| {
            user.get(*field)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
        })
        .unwrap_or("usuario")
}

impl Store {
    // =========================================================================
    // Auth
    // =========================================================================

    /// Replaces the session and greets the user. Returns the notification id.
    ///
    /// Stale fields from a previous session are cleared first, so the user
    /// profile is not merged with the last one.
    pub fn login(
        &self,
        user: Value,
        token: impl Into<String>,
        refresh_token: Option<String>,
    ) -> String {
        let greeting = format!("Hola, {}", display_name(&user));
        self.set_batch([
            SlicePatch::from(AuthPatch::reset()),
            SlicePatch::from(AuthPatch {
                user: Some(Some(user)),
                is_authenticated: Some(true),
                token: Some(Some(token.into())),
                refresh_token: Some(refresh_token),
                last_login_time: Some(Some(Utc::now())),
            }),
        ]);
        info!("User logged in");
        self.add_notification(NewNotification::new(
            NotificationType::Success,
            "Bienvenido",
            greeting,
        ))
    }

    pub fn logout(&self) {
        self.set_patch(AuthPatch::reset().into());
        info!("User logged out");
        self.add_notification(NewNotification::new(
            NotificationType::Info,
            "Sesión cerrada",
            "Has cerrado sesión correctamente",
        ));
    }

    // =========================================================================
    // UI
    // =========================================================================

    pub fn set_theme(&self, theme: Theme) {
        self.set::<UiState>(UiPatch {
            theme: Some(theme),
            ..Default::default()
        });
    }

    pub fn set_language(&self, language: Language) {
        self.set::<UiState>(UiPatch {
            language: Some(language),
            ..Default::default()
        });
    }

    /// Flips the sidebar; returns the new collapsed flag.
    pub fn toggle_sidebar(&self) -> bool {
        let mut collapsed = false;
        self.modify::<UiState>(|ui| {
            ui.sidebar_collapsed = !ui.sidebar_collapsed;
            collapsed = ui.sidebar_collapsed;
            true
        });
        collapsed
    }

    /// Appends a notification and returns its generated id.
    pub fn add_notification(&self, notification: NewNotification) -> String {
        let notification = notification.into_notification();
        let id = notification.id.clone();
        debug!(id = %id, kind = ?notification.kind, "Notification added");
        self.modify::<UiState>(|ui| {
            ui.notifications.push(notification);
            true
        });
        id
    }

    /// Returns false for an unknown id; nothing is written then.
    pub fn mark_notification_read(&self, id: &str) -> bool {
        let found = self.modify::<UiState>(|ui| {
            match ui.notifications.iter_mut().find(|n| n.id == id) {
                Some(n) => {
                    n.read = true;
                    true
                }
                None => false,
            }
        });
        if !found {
            debug!(id, "No notification to mark read");
        }
        found
    }

    pub fn remove_notification(&self, id: &str) -> bool {
        self.modify::<UiState>(|ui| {
            let before = ui.notifications.len();
            ui.notifications.retain(|n| n.id != id);
            ui.notifications.len() != before
        })
    }

    pub fn clear_notifications(&self) {
        self.set::<UiState>(UiPatch {
            notifications: Some(Vec::new()),
            ..Default::default()
        });
    }

    // =========================================================================
    // Navigation
    // =========================================================================

    /// Records a route change. `None` keeps the active module.
    pub fn navigate_to(&self, route: &str, module: Option<&str>) {
        let history = self.slice::<NavigationState>().routes_after_visit(route);
        self.set::<NavigationState>(NavigationPatch {
            current_route: Some(route.to_string()),
            active_module: module.map(|m| Some(m.to_string())),
            last_visited_routes: Some(history),
            ..Default::default()
        });
    }

    pub fn set_breadcrumbs(&self, breadcrumbs: Vec<Breadcrumb>) {
        self.set::<NavigationState>(NavigationPatch {
            breadcrumbs: Some(breadcrumbs),
            ..Default::default()
        });
    }

    // =========================================================================
    // Business
    // =========================================================================

    /// Replaces one context field wholesale; `None` clears it.
    pub fn set_business_context(&self, field: BusinessField, value: Option<Value>) {
        self.modify::<BusinessState>(|business| {
            *field.slot(business) = value;
            true
        });
    }

    /// Appends an item to `sharedContent`.
    pub fn share_content(&self, item: Value) {
        self.modify::<BusinessState>(|business| {
            business.shared_content.push(item);
            true
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::test_store;
    use escena_core::{AuthState, SliceKey, MAX_VISITED_ROUTES};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_login_replaces_session_and_greets() {
        let (store, _storage, _timers) = test_store();
        store.login(json!({"id": "u0", "role": "admin"}), "old", Some("r0".into()));
        let id = store.login(json!({"id": "u1", "email": "ana@escena.app"}), "tok123", None);

        let auth = store.slice::<AuthState>();
        assert!(auth.is_authenticated);
        assert_eq!(auth.user, Some(json!({"id": "u1", "email": "ana@escena.app"})));
        assert_eq!(auth.token.as_deref(), Some("tok123"));
        assert_eq!(auth.refresh_token, None);
        assert!(auth.last_login_time.is_some());

        let ui = store.slice::<UiState>();
        let greeting = ui.notifications.iter().find(|n| n.id == id).unwrap();
        assert_eq!(greeting.kind, NotificationType::Success);
        assert_eq!(greeting.title, "Bienvenido");
        assert_eq!(greeting.message, "Hola, ana@escena.app");
        assert!(!greeting.read);
    }

    #[test]
    fn test_login_and_logout_share_one_flush() {
        let (store, _storage, timers) = test_store();
        let calls = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&calls);
        store.subscribe_all(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        store.login(json!({"name": "Ana"}), "tok", None);
        assert_eq!(store.pending(), vec![SliceKey::Auth, SliceKey::Ui]);
        timers.advance(std::time::Duration::from_millis(16));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let greeted = store.slice::<UiState>();
        assert_eq!(greeted.notifications.len(), 1);
        assert_eq!(greeted.notifications[0].title, "Bienvenido");
        assert_eq!(greeted.notifications[0].message, "Hola, Ana");
        let user = store.slice::<AuthState>().user.unwrap();
        assert_eq!(user["name"], json!("Ana"));

        store.logout();
        store.flush();
        let auth = store.slice::<AuthState>();
        assert_eq!(auth, AuthState::default());
        let mut ui = store.slice::<UiState>();
        let last = ui.notifications.pop().unwrap();
        assert_eq!(last.title, "Sesión cerrada");
        assert_eq!(last.kind, NotificationType::Info);
    }

    #[test]
    fn test_notification_lifecycle() {
        let (store, _storage, _timers) = test_store();
        let a = store.add_notification(NewNotification::new(NotificationType::Info, "A", "a"));
        let b = store.add_notification(NewNotification::new(NotificationType::Warning, "B", "b"));
        assert_ne!(a, b);

        assert!(store.mark_notification_read(&a));
        store.flush();
        assert!(!store.mark_notification_read("missing"));
        assert!(store.pending().is_empty());

        let ui = store.slice::<UiState>();
        assert_eq!(ui.notifications.len(), 2);
        assert!(ui.notifications[0].read);
        assert!(!ui.notifications[1].read);

        assert!(store.remove_notification(&a));
        assert!(!store.remove_notification(&a));
        assert_eq!(store.slice::<UiState>().notifications[0].id, b);

        store.clear_notifications();
        assert!(store.slice::<UiState>().notifications.is_empty());
    }

    #[test]
    fn test_visited_routes_are_capped_and_unique() {
        let (store, _storage, _timers) = test_store();
        for i in 0..15 {
            store.navigate_to(&format!("/r{}", i), None);
        }
        store.navigate_to("/r12", Some("clubs"));

        let nav = store.slice::<NavigationState>();
        assert_eq!(nav.current_route, "/r12");
        assert_eq!(nav.active_module.as_deref(), Some("clubs"));
        assert_eq!(nav.last_visited_routes.len(), MAX_VISITED_ROUTES);
        assert_eq!(nav.last_visited_routes[0], "/r12");
        assert_eq!(nav.last_visited_routes[1], "/r14");
        assert_eq!(
            nav.last_visited_routes.iter().filter(|r| *r == "/r12").count(),
            1
        );

        store.navigate_to("/home", None);
        assert_eq!(
            store.slice::<NavigationState>().active_module.as_deref(),
            Some("clubs")
        );
    }

    #[test]
    fn test_ui_toggles() {
        let (store, _storage, _timers) = test_store();
        assert!(store.toggle_sidebar());
        assert!(!store.toggle_sidebar());
        store.set_theme(Theme::Dark);
        store.set_language(Language::Ca);
        let ui = store.slice::<UiState>();
        assert_eq!(ui.theme, Theme::Dark);
        assert_eq!(ui.language, Language::Ca);
    }

    #[test]
    fn test_business_context_replaces() {
        let (store, _storage, _timers) = test_store();
        store.set_business_context(
            BusinessField::SelectedArtist,
            Some(json!({"id": "a1", "genre": "techno"})),
        );
        store.set_business_context(BusinessField::SelectedArtist, Some(json!({"id": "a2"})));
        store.share_content(json!({"kind": "track", "id": 7}));
        store.share_content(json!({"kind": "event", "id": 9}));

        let business = store.slice::<BusinessState>();
        assert_eq!(business.selected_artist, Some(json!({"id": "a2"})));
        assert_eq!(business.shared_content.len(), 2);

        store.set_business_context(BusinessField::SelectedArtist, None);
        assert_eq!(store.slice::<BusinessState>().selected_artist, None);
    }

    #[test]
    fn test_display_name_fallbacks() {
        assert_eq!(display_name(&json!({"name": "Ana", "email": "a@x"})), "Ana");
        assert_eq!(display_name(&json!({"email": "a@x"})), "a@x");
        assert_eq!(display_name(&json!({"name": "", "email": "a@x"})), "a@x");
        assert_eq!(display_name(&json!({"name": "", "email": ""})), "usuario");
        assert_eq!(display_name(&json!({"id": 1})), "usuario");
        assert_eq!(display_name(&json!("not an object")), "usuario");
    }
}
