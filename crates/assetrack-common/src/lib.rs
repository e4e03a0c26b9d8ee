//! Core shared pieces for Assetrack services: logging setup, layered
//! configuration loading, and identity-provider constants.

pub mod auth_constants;
pub mod config;
pub mod logging;

pub use config::{ConfigLoader, ConfigurationError};

/// Marker implemented by every service-level error type
pub trait AssetrackError: std::error::Error + Send + Sync + 'static {}
