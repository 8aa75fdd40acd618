//! Configuration loader with file and environment variable support

use crate::{AppConfig, ConfigError};
use std::env;
use std::path::PathBuf;
use tracing::info;

/// Standard config file search paths
const CONFIG_PATHS: &[&str] = &[
    "config.toml",
    "exambase.toml",
    "./config/config.toml",
    "/etc/exambase/config.toml",
];

/// Configuration loader
pub struct ConfigLoader {
    config_path: Option<PathBuf>,
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new() -> Self {
        Self { config_path: None }
    }

    /// Create a loader with a specific config file path
    pub fn with_path<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            config_path: Some(path.into()),
        }
    }

    /// Load configuration from file (if found) with environment variable overrides
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        let mut config = AppConfig::default();

        if let Some(path) = self.find_config_file() {
            info!(?path, "Loading configuration from file");
            config = AppConfig::from_file(&path)?;
        }

        apply_overrides(&mut config, |key| env::var(key).ok());

        Ok(config)
    }

    fn find_config_file(&self) -> Option<PathBuf> {
        if let Some(path) = &self.config_path {
            if path.exists() {
                return Some(path.clone());
            }
        }

        if let Ok(path) = env::var("EXAMBASE_CONFIG") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        CONFIG_PATHS
            .iter()
            .map(PathBuf::from)
            .find(|path| path.exists())
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Apply `EXAMBASE_*` overrides using the given variable lookup.
fn apply_overrides<F>(config: &mut AppConfig, var: F)
where
    F: Fn(&str) -> Option<String>,
{
    // HTTP
    if let Some(port) = var("EXAMBASE_HTTP_PORT").and_then(|v| v.parse().ok()) {
        config.http.port = port;
    }
    if let Some(val) = var("EXAMBASE_HTTP_HOST") {
        config.http.host = val;
    }
    if let Some(val) = var("EXAMBASE_CORS_ORIGINS") {
        config.http.cors_origins = val.split(',').map(|s| s.trim().to_string()).collect();
    }

    // MongoDB
    if let Some(val) = var("EXAMBASE_MONGODB_URI") {
        config.mongodb.uri = val;
    }
    if let Some(val) = var("EXAMBASE_MONGODB_DATABASE") {
        config.mongodb.database = val;
    }

    // Profile store
    if let Some(val) = var("EXAMBASE_PROFILE_STORE") {
        config.profile_store.backend = val;
    }
    if let Some(val) = var("EXAMBASE_ENSURE_INDEXES") {
        config.profile_store.ensure_indexes = val.parse().unwrap_or(true);
    }

    // Identity directory
    if let Some(val) = var("EXAMBASE_IDENTITY_PROVIDER") {
        config.identity.provider = val;
    }
    if let Some(val) = var("EXAMBASE_KEYCLOAK_URL") {
        config.identity.keycloak.server_url = val;
    }
    if let Some(val) = var("EXAMBASE_KEYCLOAK_REALM") {
        config.identity.keycloak.realm = val;
    }
    if let Some(val) = var("EXAMBASE_KEYCLOAK_CLIENT_ID") {
        config.identity.keycloak.client_id = val;
    }
    if let Some(val) = var("EXAMBASE_KEYCLOAK_CLIENT_SECRET") {
        config.identity.keycloak.client_secret = val;
    }
    if let Some(timeout) = var("EXAMBASE_KEYCLOAK_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
        config.identity.keycloak.timeout_secs = timeout;
    }

    // Provisioning
    if let Some(len) = var("EXAMBASE_MIN_SECRET_LENGTH").and_then(|v| v.parse().ok()) {
        config.provisioning.min_secret_length = len;
    }
    if let Some(size) = var("EXAMBASE_MAX_BATCH_SIZE").and_then(|v| v.parse().ok()) {
        config.provisioning.max_batch_size = size;
    }

    // General
    if let Some(val) = var("EXAMBASE_DEV_MODE") {
        config.dev_mode = val == "true" || val == "1";
    }
}
