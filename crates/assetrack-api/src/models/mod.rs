//! Shared models for the Assetrack API

pub mod audit;
pub mod principal;

pub use audit::{AuditAction, AuditEvent, RequestMeta};
pub use principal::{Permission, Principal, ProfileUpdate, Role, UnknownTag};
