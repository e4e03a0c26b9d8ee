//! Configuration loading shared by Assetrack services
//!
//! Every service layers its configuration the same way: compiled defaults,
//! then a TOML file, then prefixed environment variables (`__` separates
//! nested keys).

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{de::DeserializeOwned, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised while loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Failed to parse configuration: {details}")]
    ParseError { details: String },

    #[error("Invalid configuration value for '{key}': {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("Missing required configuration: {key}")]
    MissingRequired { key: String },
}

/// Layered configuration loader.
///
/// Implementors only supply the file name and environment prefix; the
/// provided methods do the figment plumbing.
pub trait ConfigLoader: Serialize + DeserializeOwned + Default {
    /// File read when no explicit path is given
    const DEFAULT_FILE: &'static str;

    /// Environment prefix, e.g. `ASSETRACK_API_`
    const ENV_PREFIX: &'static str;

    /// Load from the default file (if present) and the environment.
    fn load(path: Option<PathBuf>) -> Result<Self, ConfigurationError> {
        match path {
            Some(p) => Self::load_from_file(&p),
            None => Self::load_from_file(Path::new(Self::DEFAULT_FILE)),
        }
    }

    /// Load from a specific file and the environment.
    fn load_from_file(path: &Path) -> Result<Self, ConfigurationError> {
        Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(Self::ENV_PREFIX).split("__"))
            .extract()
            .map_err(|e| ConfigurationError::ParseError {
                details: e.to_string(),
            })
    }

    /// Render the defaults as TOML, for `--gen-config`.
    fn generate_example() -> Result<String, ConfigurationError> {
        toml::to_string_pretty(&Self::default()).map_err(|e| ConfigurationError::ParseError {
            details: format!("Failed to serialize config: {e}"),
        })
    }
}
