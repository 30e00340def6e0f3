//! # Store Configuration
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     ESCENA_STORAGE=session                                             │
//! │     ESCENA_PERSIST=auth,ui                                             │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/shared-state/escena.toml (Linux)                         │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     persist auth/ui/navigation to durable storage                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # escena.toml
//! app_prefix = "escena"
//! persist = ["auth", "ui", "navigation"]
//! strategy = "durable"          # durable | session
//! batch_delay_ms = 16
//! persist_interval_secs = 30
//! heartbeat_interval_secs = 5
//! migrate_legacy = true
//! legacy_mirror = true
//! debug = false
//! ```

use std::path::PathBuf;
use std::time::Duration;

use escena_core::SliceKey;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{StoreError, StoreResult};

pub const CONFIG_FILE_NAME: &str = "escena.toml";

// =============================================================================
// Storage Strategy
// =============================================================================

/// Which medium persisted slices are written to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageStrategy {
    /// Survives restarts (file backend).
    #[default]
    Durable,
    /// Lives as long as the process (memory backend).
    Session,
}

impl std::fmt::Display for StorageStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageStrategy::Durable => write!(f, "durable"),
            StorageStrategy::Session => write!(f, "session"),
        }
    }
}

impl std::str::FromStr for StorageStrategy {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "durable" | "local" => Ok(StorageStrategy::Durable),
            "session" | "memory" => Ok(StorageStrategy::Session),
            other => Err(StoreError::Config(format!(
                "Unknown storage strategy: '{}'. Valid options: durable, session",
                other
            ))),
        }
    }
}

// =============================================================================
// Store Configuration
// =============================================================================

fn default_app_prefix() -> String {
    "escena".to_string()
}

fn default_persist() -> Vec<SliceKey> {
    vec![SliceKey::Auth, SliceKey::Ui, SliceKey::Navigation]
}

fn default_batch_delay_ms() -> u64 {
    16
}

fn default_persist_interval_secs() -> u64 {
    30
}

fn default_heartbeat_interval_secs() -> u64 {
    5
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Namespace for every persisted key (`<prefix>_<slice>_state`).
    #[serde(default = "default_app_prefix")]
    pub app_prefix: String,

    /// Slices written through to storage.
    #[serde(default = "default_persist")]
    pub persist: Vec<SliceKey>,

    #[serde(default)]
    pub strategy: StorageStrategy,

    /// Durable storage directory. Platform data dir when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_dir: Option<PathBuf>,

    /// Coalescing window for listener notification.
    #[serde(default = "default_batch_delay_ms")]
    pub batch_delay_ms: u64,

    /// Safety-net full persistence flush.
    #[serde(default = "default_persist_interval_secs")]
    pub persist_interval_secs: u64,

    /// System monitor heartbeat.
    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,

    /// Import flat legacy keys on startup.
    #[serde(default = "default_true")]
    pub migrate_legacy: bool,

    /// Keep writing flat legacy keys for consumers not yet migrated.
    #[serde(default = "default_true")]
    pub legacy_mirror: bool,

    /// Expose the process-wide debug handle.
    #[serde(default)]
    pub debug: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            app_prefix: default_app_prefix(),
            persist: default_persist(),
            strategy: StorageStrategy::default(),
            storage_dir: None,
            batch_delay_ms: default_batch_delay_ms(),
            persist_interval_secs: default_persist_interval_secs(),
            heartbeat_interval_secs: default_heartbeat_interval_secs(),
            migrate_legacy: true,
            legacy_mirror: true,
            debug: false,
        }
    }
}

impl StoreConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (escena.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> StoreResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading store config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads configuration, falling back to defaults on any error.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load store config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> StoreResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| StoreError::Config("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Saved store config");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> StoreResult<()> {
        let prefix_ok = !self.app_prefix.is_empty()
            && self
                .app_prefix
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !prefix_ok {
            return Err(StoreError::Config(format!(
                "app_prefix must be non-empty and use only [A-Za-z0-9_-], got: '{}'",
                self.app_prefix
            )));
        }

        if self.batch_delay_ms == 0 {
            return Err(StoreError::Config("batch_delay_ms must be > 0".into()));
        }
        if self.persist_interval_secs == 0 {
            return Err(StoreError::Config("persist_interval_secs must be > 0".into()));
        }
        if self.heartbeat_interval_secs == 0 {
            return Err(StoreError::Config("heartbeat_interval_secs must be > 0".into()));
        }

        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// Applies `ESCENA_*` overrides read through `lookup`. Bad values are skipped.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(prefix) = lookup("ESCENA_APP_PREFIX") {
            debug!(app_prefix = %prefix, "Overriding app prefix from environment");
            self.app_prefix = prefix;
        }

        if let Some(list) = lookup("ESCENA_PERSIST") {
            let parsed: Result<Vec<SliceKey>, _> = list
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::parse::<SliceKey>)
                .collect();
            match parsed {
                Ok(keys) => self.persist = keys,
                Err(e) => warn!(%e, "Ignoring ESCENA_PERSIST"),
            }
        }

        if let Some(strategy) = lookup("ESCENA_STORAGE") {
            match strategy.parse() {
                Ok(s) => self.strategy = s,
                Err(e) => warn!(%e, "Ignoring ESCENA_STORAGE"),
            }
        }

        if let Some(dir) = lookup("ESCENA_STORAGE_DIR") {
            self.storage_dir = Some(PathBuf::from(dir));
        }

        if let Some(flag) = lookup("ESCENA_LEGACY_MIRROR") {
            match parse_flag(&flag) {
                Some(v) => self.legacy_mirror = v,
                None => warn!(value = %flag, "Ignoring ESCENA_LEGACY_MIRROR"),
            }
        }

        if let Some(flag) = lookup("ESCENA_DEBUG") {
            match parse_flag(&flag) {
                Some(v) => self.debug = v,
                None => warn!(value = %flag, "Ignoring ESCENA_DEBUG"),
            }
        }
    }

    /// Default config file path, e.g. `~/.config/shared-state/escena.toml`.
    pub fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "escena", "shared-state")
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
    }

    // =========================================================================
    // Builder Methods
    // =========================================================================

    pub fn app_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.app_prefix = prefix.into();
        self
    }

    pub fn persist(mut self, slices: &[SliceKey]) -> Self {
        self.persist = slices.to_vec();
        self
    }

    pub fn strategy(mut self, strategy: StorageStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn storage_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.storage_dir = Some(dir.into());
        self
    }

    pub fn batch_delay_ms(mut self, ms: u64) -> Self {
        self.batch_delay_ms = ms;
        self
    }

    pub fn migrate_legacy(mut self, enabled: bool) -> Self {
        self.migrate_legacy = enabled;
        self
    }

    pub fn legacy_mirror(mut self, enabled: bool) -> Self {
        self.legacy_mirror = enabled;
        self
    }

    pub fn debug(mut self, enabled: bool) -> Self {
        self.debug = enabled;
        self
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }

    pub fn persist_interval(&self) -> Duration {
        Duration::from_secs(self.persist_interval_secs)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn persists(&self, key: SliceKey) -> bool {
        self.persist.contains(&key)
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_strategy_parsing() {
        assert_eq!("durable".parse::<StorageStrategy>().unwrap(), StorageStrategy::Durable);
        assert_eq!("SESSION".parse::<StorageStrategy>().unwrap(), StorageStrategy::Session);
        assert!("cloud".parse::<StorageStrategy>().is_err());
    }

    #[test]
    fn test_default_config() {
        let config = StoreConfig::default();
        assert_eq!(config.app_prefix, "escena");
        assert_eq!(config.persist, vec![SliceKey::Auth, SliceKey::Ui, SliceKey::Navigation]);
        assert_eq!(config.batch_delay(), Duration::from_millis(16));
        assert_eq!(config.persist_interval(), Duration::from_secs(30));
        assert_eq!(config.heartbeat_interval(), Duration::from_secs(5));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        assert!(StoreConfig::default().app_prefix("").validate().is_err());
        assert!(StoreConfig::default().app_prefix("a/b").validate().is_err());
        assert!(StoreConfig::default().batch_delay_ms(0).validate().is_err());
        assert!(StoreConfig::default().app_prefix("my-app").validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: StoreConfig = toml::from_str(
            r#"
            persist = ["ui"]
            strategy = "session"
            "#,
        )
        .unwrap();
        assert_eq!(config.persist, vec![SliceKey::Ui]);
        assert_eq!(config.strategy, StorageStrategy::Session);
        assert_eq!(config.app_prefix, "escena");
        assert!(config.migrate_legacy);
    }

    #[test]
    fn test_unknown_slice_in_toml_rejected() {
        let result: Result<StoreConfig, _> = toml::from_str(r#"persist = ["profile"]"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [
            ("ESCENA_PERSIST", "auth, ui"),
            ("ESCENA_STORAGE", "session"),
            ("ESCENA_DEBUG", "1"),
            ("ESCENA_LEGACY_MIRROR", "maybe"),
        ]
        .into_iter()
        .collect();

        let mut config = StoreConfig::default();
        config.apply_overrides(|name| env.get(name).map(|v| v.to_string()));

        assert_eq!(config.persist, vec![SliceKey::Auth, SliceKey::Ui]);
        assert_eq!(config.strategy, StorageStrategy::Session);
        assert!(config.debug);
        assert!(config.legacy_mirror);
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        let config = StoreConfig::default()
            .persist(&[SliceKey::Ui])
            .batch_delay_ms(5);
        config.save(Some(path.clone())).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let loaded: StoreConfig = toml::from_str(&contents).unwrap();
        assert_eq!(loaded, config);
    }
}
