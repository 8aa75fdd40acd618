//! Exambase Configuration System
//!
//! TOML-based configuration with environment variable overrides. The
//! resulting [`AppConfig`] is built once at process start and handed to the
//! adapters and services explicitly.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

mod loader;

pub use loader::ConfigLoader;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Root application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub http: HttpConfig,
    pub mongodb: MongoConfig,
    pub profile_store: ProfileStoreConfig,
    pub identity: IdentityConfig,
    pub provisioning: ProvisioningConfig,

    /// Enable development mode
    pub dev_mode: bool,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub port: u16,
    pub host: String,
    pub cors_origins: Vec<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            host: "0.0.0.0".to_string(),
            cors_origins: vec!["http://localhost:4200".to_string()],
        }
    }
}

/// MongoDB configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MongoConfig {
    pub uri: String,
    pub database: String,
}

impl Default for MongoConfig {
    fn default() -> Self {
        Self {
            uri: "mongodb://localhost:27017".to_string(),
            database: "exambase".to_string(),
        }
    }
}

/// Profile store backend selection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileStoreConfig {
    /// Backend: mongodb, memory
    pub backend: String,
    /// Create the unique indexes on startup
    pub ensure_indexes: bool,
}

impl Default for ProfileStoreConfig {
    fn default() -> Self {
        Self {
            backend: "mongodb".to_string(),
            ensure_indexes: true,
        }
    }
}

/// Identity directory configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Provider: keycloak, memory
    pub provider: String,
    pub keycloak: KeycloakSettings,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            provider: "keycloak".to_string(),
            keycloak: KeycloakSettings::default(),
        }
    }
}

/// Keycloak admin API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeycloakSettings {
    pub server_url: String,
    pub realm: String,
    pub client_id: String,
    pub client_secret: String,
    pub timeout_secs: u64,
}

impl Default for KeycloakSettings {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:8180".to_string(),
            realm: "exambase".to_string(),
            client_id: "exambase-admin".to_string(),
            client_secret: String::new(),
            timeout_secs: 10,
        }
    }
}

/// Provisioning rules
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisioningConfig {
    pub min_secret_length: usize,
    pub max_batch_size: usize,
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self {
            min_secret_length: 6,
            max_batch_size: 500,
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Load configuration with environment variable override
    pub fn load() -> Result<Self, ConfigError> {
        ConfigLoader::new().load()
    }

    /// Reject settings the server cannot start with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.identity.provider.as_str() {
            "memory" => {}
            "keycloak" => {
                let kc = &self.identity.keycloak;
                if kc.server_url.trim().is_empty() || kc.realm.trim().is_empty() {
                    return Err(ConfigError::ValidationError(
                        "identity.keycloak.server_url and realm are required".to_string(),
                    ));
                }
                if kc.client_id.trim().is_empty() || kc.client_secret.is_empty() {
                    return Err(ConfigError::ValidationError(
                        "identity.keycloak.client_id and client_secret are required".to_string(),
                    ));
                }
            }
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "Unknown identity provider: {}",
                    other
                )))
            }
        }

        match self.profile_store.backend.as_str() {
            "memory" => {}
            "mongodb" => {
                if self.mongodb.uri.trim().is_empty() || self.mongodb.database.trim().is_empty() {
                    return Err(ConfigError::ValidationError(
                        "mongodb.uri and mongodb.database are required".to_string(),
                    ));
                }
            }
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "Unknown profile store backend: {}",
                    other
                )))
            }
        }

        if self.provisioning.min_secret_length == 0 {
            return Err(ConfigError::ValidationError(
                "provisioning.min_secret_length must be at least 1".to_string(),
            ));
        }
        if self.provisioning.max_batch_size == 0 {
            return Err(ConfigError::ValidationError(
                "provisioning.max_batch_size must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    /// Generate an example TOML configuration
    pub fn example_toml() -> String {
        r#"# Exambase Configuration
# Environment variables (EXAMBASE_*) override these settings

dev_mode = false

[http]
port = 8080
host = "0.0.0.0"
cors_origins = ["http://localhost:4200"]

[mongodb]
uri = "mongodb://localhost:27017"
database = "exambase"

[profile_store]
backend = "mongodb"  # mongodb, memory
ensure_indexes = true

[identity]
provider = "keycloak"  # keycloak, memory

[identity.keycloak]
server_url = "http://localhost:8180"
realm = "exambase"
client_id = "exambase-admin"
client_secret = ""
timeout_secs = 10

[provisioning]
min_secret_length = 6
max_batch_size = 500
"#
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.http.port, 8080);
        assert_eq!(config.identity.provider, "keycloak");
        assert_eq!(config.profile_store.backend, "mongodb");
        assert_eq!(config.provisioning.min_secret_length, 6);
        assert!(!config.dev_mode);
    }

    #[test]
    fn test_example_toml_parses() {
        let config = AppConfig::from_toml(&AppConfig::example_toml()).unwrap();
        assert_eq!(config.mongodb.database, "exambase");
        assert_eq!(config.identity.keycloak.realm, "exambase");
        assert_eq!(config.provisioning.max_batch_size, 500);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = AppConfig::from_toml(
            r#"
[identity]
provider = "memory"
"#,
        )
        .unwrap();
        assert_eq!(config.identity.provider, "memory");
        assert_eq!(config.identity.keycloak.timeout_secs, 10);
        assert_eq!(config.http.port, 8080);
    }

    #[test]
    fn test_validate_memory_backends() {
        let mut config = AppConfig::default();
        config.identity.provider = "memory".to_string();
        config.profile_store.backend = "memory".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_keycloak_without_secret() {
        let config = AppConfig::default();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("client_secret"));
    }

    #[test]
    fn test_validate_rejects_unknown_provider() {
        let mut config = AppConfig::default();
        config.identity.provider = "firebase".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_validate_rejects_zero_batch_size() {
        let mut config = AppConfig::default();
        config.identity.provider = "memory".to_string();
        config.provisioning.max_batch_size = 0;
        assert!(config.validate().is_err());
    }
}
