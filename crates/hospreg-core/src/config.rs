use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::{Arc, PoisonError, RwLock};

use dirs::config_dir;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::storage::{KeyValueStore, StorageKey};

const CONFIG_DIR_NAME: &str = "hospreg";
const CONFIG_FILE_NAME: &str = "config.toml";
const CURRENT_SCHEMA_VERSION: u32 = 1;

/// Mode used when nothing else decides.
pub const DEFAULT_SERVER_MODE: ServerMode = ServerMode::Mock;
/// When set, every startup overwrites the persisted mode with the default.
pub const FORCE_SERVER_MODE: bool = true;
pub const DEFAULT_MOCK_BASE_URL: &str = "http://10.83.39.15:8082";
pub const DEFAULT_PROD_BASE_URL: &str = "http://10.83.39.15:8082";
pub const DEFAULT_LOGIN_ROUTE: &str = "/pages/login/Login";

/// Which backend the client talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerMode {
    Mock,
    Prod,
}

impl ServerMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ServerMode::Mock => "mock",
            ServerMode::Prod => "prod",
        }
    }
}

impl fmt::Display for ServerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown server mode '{0}' (expected 'mock' or 'prod')")]
pub struct ParseServerModeError(pub String);

impl FromStr for ServerMode {
    type Err = ParseServerModeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "mock" => Ok(ServerMode::Mock),
            "prod" => Ok(ServerMode::Prod),
            other => Err(ParseServerModeError(other.to_string())),
        }
    }
}

/// Result returned by [`load_config`], capturing the source and any non-fatal issues.
#[derive(Debug, Clone)]
pub struct ConfigLoadResult {
    pub config: FileConfig,
    pub warnings: Vec<String>,
    pub source: ConfigSource,
}

/// Indicates where the configuration was loaded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSource {
    /// No persisted configuration was found or usable; defaults were synthesized.
    Default,
    /// Configuration was read from `config.toml`.
    File,
}

/// Errors that can occur when persisting configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML serialization error: {0}")]
    Ser(#[from] toml::ser::Error),
}

/// Disk-backed configuration schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default = "FileConfig::schema_version")]
    pub schema_version: u32,
    #[serde(default)]
    pub server: ServerSettings,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            schema_version: CURRENT_SCHEMA_VERSION,
            server: ServerSettings::default(),
        }
    }
}

impl FileConfig {
    const fn schema_version() -> u32 {
        CURRENT_SCHEMA_VERSION
    }
}

/// Backend endpoints and mode policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "ServerSettings::default_mode")]
    pub default_mode: ServerMode,
    #[serde(default = "ServerSettings::default_force_mode")]
    pub force_mode: bool,
    #[serde(default = "ServerSettings::default_mock_base_url")]
    pub mock_base_url: String,
    #[serde(default = "ServerSettings::default_prod_base_url")]
    pub prod_base_url: String,
    #[serde(default = "ServerSettings::default_login_route")]
    pub login_route: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            default_mode: DEFAULT_SERVER_MODE,
            force_mode: FORCE_SERVER_MODE,
            mock_base_url: Self::default_mock_base_url(),
            prod_base_url: Self::default_prod_base_url(),
            login_route: Self::default_login_route(),
        }
    }
}

impl ServerSettings {
    const fn default_mode() -> ServerMode {
        DEFAULT_SERVER_MODE
    }

    const fn default_force_mode() -> bool {
        FORCE_SERVER_MODE
    }

    fn default_mock_base_url() -> String {
        DEFAULT_MOCK_BASE_URL.to_string()
    }

    fn default_prod_base_url() -> String {
        DEFAULT_PROD_BASE_URL.to_string()
    }

    fn default_login_route() -> String {
        DEFAULT_LOGIN_ROUTE.to_string()
    }

    pub fn base_url_for(&self, mode: ServerMode) -> &str {
        match mode {
            ServerMode::Mock => &self.mock_base_url,
            ServerMode::Prod => &self.prod_base_url,
        }
    }
}

/// Path to the configuration directory.
pub fn config_directory() -> PathBuf {
    config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_DIR_NAME)
}

/// Path to `config.toml`.
pub fn config_path() -> PathBuf {
    config_directory().join(CONFIG_FILE_NAME)
}

/// Load the configuration from the default location, falling back to defaults.
pub fn load_config() -> ConfigLoadResult {
    load_config_from(&config_path())
}

/// Load the configuration from `path`. Never fails; problems become warnings.
pub fn load_config_from(path: &std::path::Path) -> ConfigLoadResult {
    let mut warnings = Vec::new();

    if path.exists() {
        match fs::read_to_string(path) {
            Ok(raw) => match toml::from_str::<FileConfig>(&raw) {
                Ok(cfg) => {
                    let (cfg, mut sanitize_warnings) = sanitize_config(cfg);
                    warnings.append(&mut sanitize_warnings);
                    return ConfigLoadResult {
                        config: cfg,
                        warnings,
                        source: ConfigSource::File,
                    };
                }
                Err(err) => warnings.push(format!(
                    "Failed to parse {} as TOML: {}. Falling back to defaults.",
                    path.display(),
                    err
                )),
            },
            Err(err) => warnings.push(format!(
                "Failed to read {}: {}. Falling back to defaults.",
                path.display(),
                err
            )),
        }
    }

    ConfigLoadResult {
        config: FileConfig::default(),
        warnings,
        source: ConfigSource::Default,
    }
}

/// Persist the configuration to the default location.
pub fn save_config(config: &FileConfig) -> Result<(), ConfigError> {
    save_config_to(&config_path(), config)
}

pub fn save_config_to(path: &std::path::Path, config: &FileConfig) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, toml::to_string_pretty(config)?)?;
    Ok(())
}

fn sanitize_config(mut config: FileConfig) -> (FileConfig, Vec<String>) {
    let mut warnings = Vec::new();

    if config.schema_version != CURRENT_SCHEMA_VERSION {
        warnings.push(format!(
            "Unknown config schema version {}. Resetting to {}.",
            config.schema_version, CURRENT_SCHEMA_VERSION
        ));
        return (FileConfig::default(), warnings);
    }

    let server = &mut config.server;
    for (label, url, fallback) in [
        ("mock_base_url", &mut server.mock_base_url, DEFAULT_MOCK_BASE_URL),
        ("prod_base_url", &mut server.prod_base_url, DEFAULT_PROD_BASE_URL),
    ] {
        let trimmed = url.trim().trim_end_matches('/');
        if trimmed.is_empty() {
            warnings.push(format!("{label} is empty. Resetting to {fallback}."));
            *url = fallback.to_string();
        } else if !trimmed.starts_with("http://") && !trimmed.starts_with("https://") {
            warnings.push(format!(
                "{label} '{trimmed}' is not an http(s) URL. Resetting to {fallback}."
            ));
            *url = fallback.to_string();
        } else {
            *url = trimmed.to_string();
        }
    }

    if !server.login_route.starts_with('/') {
        warnings.push(format!(
            "login_route '{}' must start with '/'. Resetting to {}.",
            server.login_route, DEFAULT_LOGIN_ROUTE
        ));
        server.login_route = DEFAULT_LOGIN_ROUTE.to_string();
    }

    (config, warnings)
}

/// Resolves which backend base URL to use.
pub struct EnvironmentResolver {
    settings: ServerSettings,
    store: Arc<dyn KeyValueStore>,
    current: RwLock<Option<ServerMode>>,
}

impl fmt::Debug for EnvironmentResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvironmentResolver")
            .field("settings", &self.settings)
            .field("current", &self.current)
            .finish_non_exhaustive()
    }
}

impl EnvironmentResolver {
    pub fn new(settings: ServerSettings, store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            settings,
            store,
            current: RwLock::new(None),
        }
    }

    pub fn settings(&self) -> &ServerSettings {
        &self.settings
    }

    /// Startup resolution: a valid launch override wins and is persisted;
    /// otherwise the default is persisted when nothing is stored yet or the
    /// force flag is on.
    pub fn bootstrap(&self, launch_override: Option<&str>) -> ServerMode {
        if let Some(raw) = launch_override {
            match raw.trim().parse::<ServerMode>() {
                Ok(mode) => {
                    self.set_server_mode(mode);
                    info!(mode = %mode, "Server mode taken from launch override");
                    return mode;
                }
                Err(err) => warn!(error = %err, "Ignoring launch override"),
            }
        }

        let persisted = self.persisted_mode();
        if persisted.is_none() || self.settings.force_mode {
            self.set_server_mode(self.settings.default_mode);
        }
        let mode = self.get_mode();
        info!(mode = %mode, "Server mode resolved");
        mode
    }

    pub fn get_mode(&self) -> ServerMode {
        if let Some(mode) = *self.current.read().unwrap_or_else(PoisonError::into_inner) {
            return mode;
        }
        self.persisted_mode().unwrap_or(self.settings.default_mode)
    }

    /// Accepts only `"mock"` or `"prod"`; anything else returns `false` and
    /// leaves the mode untouched.
    pub fn set_mode(&self, mode: &str) -> bool {
        match mode.parse::<ServerMode>() {
            Ok(mode) => self.set_server_mode(mode),
            Err(err) => {
                warn!(error = %err, "Rejected server mode");
                false
            }
        }
    }

    pub fn set_server_mode(&self, mode: ServerMode) -> bool {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(mode);
        if let Err(err) = self.store.set(StorageKey::ServerMode, mode.as_str()) {
            warn!(error = %err, mode = %mode, "Failed to persist server mode; keeping it for this process");
        }
        true
    }

    pub fn base_url(&self) -> String {
        self.settings.base_url_for(self.get_mode()).to_string()
    }

    fn persisted_mode(&self) -> Option<ServerMode> {
        match self.store.get(StorageKey::ServerMode) {
            Ok(Some(raw)) => raw.parse().ok(),
            Ok(None) => None,
            Err(err) => {
                warn!(error = %err, "Failed to read persisted server mode");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryStore, StorageError};
    use tempfile::tempdir;

    struct BrokenStore;

    impl KeyValueStore for BrokenStore {
        fn get(&self, _key: StorageKey) -> Result<Option<String>, StorageError> {
            Err(StorageError::Io(std::io::Error::other("read failed")))
        }
        fn set(&self, _key: StorageKey, _value: &str) -> Result<(), StorageError> {
            Err(StorageError::Io(std::io::Error::other("write failed")))
        }
        fn remove(&self, _key: StorageKey) -> Result<(), StorageError> {
            Err(StorageError::Io(std::io::Error::other("remove failed")))
        }
    }

    fn settings(force_mode: bool) -> ServerSettings {
        ServerSettings {
            force_mode,
            mock_base_url: "http://mock.local".to_string(),
            prod_base_url: "https://prod.example".to_string(),
            ..ServerSettings::default()
        }
    }

    #[test]
    fn set_mode_then_get_mode() {
        let resolver = EnvironmentResolver::new(settings(false), Arc::new(MemoryStore::new()));
        assert!(resolver.set_mode("prod"));
        assert_eq!(resolver.get_mode(), ServerMode::Prod);
        assert!(resolver.set_mode("mock"));
        assert_eq!(resolver.get_mode(), ServerMode::Mock);
        assert_eq!(resolver.base_url(), "http://mock.local");
    }

    #[test]
    fn invalid_mode_is_rejected_and_prior_mode_kept() {
        let resolver = EnvironmentResolver::new(settings(false), Arc::new(MemoryStore::new()));
        assert!(resolver.set_mode("prod"));
        assert!(!resolver.set_mode("invalid"));
        assert!(!resolver.set_mode("PROD"));
        assert_eq!(resolver.get_mode(), ServerMode::Prod);
    }

    #[test]
    fn invalid_persisted_value_falls_back_to_default() {
        let store = Arc::new(MemoryStore::new());
        store.set(StorageKey::ServerMode, "staging").unwrap();
        let resolver = EnvironmentResolver::new(settings(false), store);
        assert_eq!(resolver.get_mode(), DEFAULT_SERVER_MODE);
    }

    #[test]
    fn bootstrap_override_wins_and_is_persisted() {
        let store = Arc::new(MemoryStore::new());
        let resolver = EnvironmentResolver::new(settings(true), store.clone());
        assert_eq!(resolver.bootstrap(Some("prod")), ServerMode::Prod);
        assert_eq!(
            store.get(StorageKey::ServerMode).unwrap().as_deref(),
            Some("prod")
        );
    }

    #[test]
    fn bootstrap_force_overwrites_user_choice() {
        let store = Arc::new(MemoryStore::new());
        store.set(StorageKey::ServerMode, "prod").unwrap();
        let resolver = EnvironmentResolver::new(settings(true), store.clone());
        assert_eq!(resolver.bootstrap(None), ServerMode::Mock);
        assert_eq!(
            store.get(StorageKey::ServerMode).unwrap().as_deref(),
            Some("mock")
        );
    }

    #[test]
    fn bootstrap_without_force_keeps_user_choice() {
        let store = Arc::new(MemoryStore::new());
        store.set(StorageKey::ServerMode, "prod").unwrap();
        let resolver = EnvironmentResolver::new(settings(false), store.clone());
        assert_eq!(resolver.bootstrap(Some("bogus")), ServerMode::Prod);
        assert_eq!(resolver.base_url(), "https://prod.example");
    }

    #[test]
    fn bootstrap_persists_default_when_nothing_stored() {
        let store = Arc::new(MemoryStore::new());
        let resolver = EnvironmentResolver::new(settings(false), store.clone());
        assert_eq!(resolver.bootstrap(None), ServerMode::Mock);
        assert_eq!(
            store.get(StorageKey::ServerMode).unwrap().as_deref(),
            Some("mock")
        );
    }

    #[test]
    fn persistence_failure_is_swallowed() {
        let resolver = EnvironmentResolver::new(settings(false), Arc::new(BrokenStore));
        assert!(resolver.set_mode("prod"));
        assert_eq!(resolver.get_mode(), ServerMode::Prod);
        assert_eq!(resolver.base_url(), "https://prod.example");
    }

    #[test]
    fn test_load_config_bad_toml() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&path, "this is = = not toml").unwrap();
        let result = load_config_from(&path);
        assert_eq!(result.source, ConfigSource::Default);
        assert_eq!(result.config, FileConfig::default());
        assert!(result.warnings.iter().any(|w| w.contains("Failed to parse")));
    }

    #[test]
    fn test_load_config_missing_file_is_default_without_warnings() {
        let dir = tempdir().expect("tempdir");
        let result = load_config_from(&dir.path().join(CONFIG_FILE_NAME));
        assert_eq!(result.source, ConfigSource::Default);
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_sanitize_blank_and_non_http_urls() {
        let mut config = FileConfig::default();
        config.server.mock_base_url = "   ".to_string();
        config.server.prod_base_url = "ftp://example".to_string();
        config.server.login_route = "pages/login".to_string();

        let (sanitized, warnings) = sanitize_config(config);
        assert_eq!(sanitized.server.mock_base_url, DEFAULT_MOCK_BASE_URL);
        assert_eq!(sanitized.server.prod_base_url, DEFAULT_PROD_BASE_URL);
        assert_eq!(sanitized.server.login_route, DEFAULT_LOGIN_ROUTE);
        assert_eq!(warnings.len(), 3);
    }

    #[test]
    fn test_sanitize_strips_trailing_slash() {
        let mut config = FileConfig::default();
        config.server.prod_base_url = "https://api.example/".to_string();
        let (sanitized, warnings) = sanitize_config(config);
        assert_eq!(sanitized.server.prod_base_url, "https://api.example");
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_sanitize_wrong_schema_version() {
        let config = FileConfig {
            schema_version: 99,
            ..FileConfig::default()
        };
        let (sanitized, warnings) = sanitize_config(config);
        assert_eq!(sanitized.schema_version, CURRENT_SCHEMA_VERSION);
        assert!(warnings.iter().any(|w| w.contains("schema version")));
    }

    #[test]
    fn test_save_then_load_round_trip() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("nested").join(CONFIG_FILE_NAME);
        let mut config = FileConfig::default();
        config.server.default_mode = ServerMode::Prod;
        config.server.force_mode = false;
        save_config_to(&path, &config).unwrap();

        let result = load_config_from(&path);
        assert_eq!(result.source, ConfigSource::File);
        assert_eq!(result.config, config);
    }
}
