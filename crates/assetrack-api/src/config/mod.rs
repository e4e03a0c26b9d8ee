//! Configuration module for the Assetrack API

mod auth;

pub use auth::{AuthConfig, FirebaseConfig};

use assetrack_common::logging::LogFormat;
use assetrack_common::{ConfigLoader, ConfigurationError as ConfigError};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: SocketAddr,

    /// Whole-request timeout, in seconds
    pub request_timeout: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([0, 0, 0, 0], 8000)),
            request_timeout: 30,
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// PostgreSQL URL. Without one the service keeps principals and audit
    /// events in memory, which is only suitable for local development.
    pub url: Option<String>,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Apply embedded migrations at startup
    pub run_migrations: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 5,
            run_migrations: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub format: LogFormat,
}

/// Main configuration structure for the Assetrack API
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub logging: LoggingConfig,
}

impl ConfigLoader for Config {
    const DEFAULT_FILE: &'static str = "assetrack-api.toml";
    const ENV_PREFIX: &'static str = "ASSETRACK_API_";
}

impl Config {
    /// Load and validate configuration from file and environment
    pub fn load_validated(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match config_path {
            Some(path) => <Config as ConfigLoader>::load_from_file(path)?,
            None => <Config as ConfigLoader>::load(None)?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.request_timeout == 0 {
            return Err(ConfigError::InvalidValue {
                key: "server.request_timeout".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.auth.firebase.verify_timeout == 0 {
            return Err(ConfigError::InvalidValue {
                key: "auth.firebase.verify_timeout".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.auth.local_token_ttl == 0 {
            return Err(ConfigError::InvalidValue {
                key: "auth.local_token_ttl".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        let project_missing = self
            .auth
            .firebase
            .project_id
            .as_deref()
            .unwrap_or_default()
            .is_empty();
        let has_api_key = self.auth.firebase.api_key.as_deref().is_some_and(|k| !k.is_empty());
        if has_api_key && project_missing {
            return Err(ConfigError::MissingRequired {
                key: "auth.firebase.project_id".to_string(),
            });
        }
        if self.database.url.as_deref() == Some("") {
            return Err(ConfigError::InvalidValue {
                key: "database.url".to_string(),
                reason: "must not be empty; omit it to use in-memory stores".to_string(),
            });
        }
        Ok(())
    }

    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout)
    }
}
