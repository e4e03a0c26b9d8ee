//! # Assetrack API
//!
//! Authentication and authorization core of the Assetrack asset tracking
//! backend.
//!
//! Three kinds of bearer token are accepted:
//!
//! - **Remote identity**: ID tokens minted by Firebase, verified against the
//!   published signing keys and provisioned into a local principal on first use
//! - **Local JWT**: HMAC tokens issued by this service after password sign-in
//! - **Demo**: fixed development tokens, only in development builds with
//!   development mode switched on
//!
//! Resolved principals are then checked against per-route role and
//! permission guards, and every decision worth keeping lands in the audit log.

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod models;
pub mod server;
pub mod storage;

pub use config::Config;
pub use error::{ApiError, Result};
pub use server::{AppState, Server};

/// Version of the assetrack-api crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
