//! Security audit records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::principal::Principal;

/// Placeholder for any field we could not determine
pub const UNKNOWN: &str = "unknown";

/// What happened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    Login,
    LoginFailed,
    UserProvisioned,
    AuthenticationRejected,
    AccessDenied,
    ProfileUpdated,
    PasswordChanged,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Login => "LOGIN",
            AuditAction::LoginFailed => "LOGIN_FAILED",
            AuditAction::UserProvisioned => "USER_PROVISIONED",
            AuditAction::AuthenticationRejected => "AUTHENTICATION_REJECTED",
            AuditAction::AccessDenied => "ACCESS_DENIED",
            AuditAction::ProfileUpdated => "PROFILE_UPDATED",
            AuditAction::PasswordChanged => "PASSWORD_CHANGED",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Network metadata of the request that produced an event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestMeta {
    pub source_address: String,
    pub user_agent: String,
}

impl RequestMeta {
    pub fn new(source_address: Option<String>, user_agent: Option<String>) -> Self {
        Self {
            source_address: source_address
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| UNKNOWN.to_string()),
            user_agent: user_agent
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| UNKNOWN.to_string()),
        }
    }

    pub fn unknown() -> Self {
        Self::new(None, None)
    }
}

impl Default for RequestMeta {
    fn default() -> Self {
        Self::unknown()
    }
}

/// Append-only audit record. Every field is always present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    pub actor_id: String,
    pub action: AuditAction,
    pub resource: String,
    pub resource_id: Option<String>,
    pub details: serde_json::Value,
    pub source_address: String,
    pub user_agent: String,
    pub timestamp: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(action: AuditAction, resource: impl Into<String>, meta: &RequestMeta) -> Self {
        Self {
            actor_id: UNKNOWN.to_string(),
            action,
            resource: resource.into(),
            resource_id: None,
            details: serde_json::Value::Null,
            source_address: meta.source_address.clone(),
            user_agent: meta.user_agent.clone(),
            timestamp: Utc::now(),
        }
    }

    pub fn actor(mut self, principal: Option<&Principal>) -> Self {
        self.actor_id = principal
            .map(Principal::audit_actor_id)
            .unwrap_or_else(|| UNKNOWN.to_string());
        self
    }

    pub fn resource_id(mut self, resource_id: impl Into<String>) -> Self {
        self.resource_id = Some(resource_id.into());
        self
    }

    pub fn details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_missing_meta_defaults_to_unknown() {
        let meta = RequestMeta::new(None, Some(String::new()));
        assert_eq!(meta.source_address, "unknown");
        assert_eq!(meta.user_agent, "unknown");
    }

    #[test]
    fn test_actor_falls_back_to_unknown() {
        let event = AuditEvent::new(AuditAction::LoginFailed, "auth", &RequestMeta::unknown())
            .actor(None);
        assert_eq!(event.actor_id, "unknown");
    }

    #[test]
    fn test_event_serializes_every_field() {
        let meta = RequestMeta::new(Some("10.0.0.1".into()), Some("curl/8".into()));
        let event = AuditEvent::new(AuditAction::AccessDenied, "users", &meta)
            .resource_id("42")
            .details(json!({"reason": "insufficient-role"}));

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["action"], "ACCESS_DENIED");
        assert_eq!(value["sourceAddress"], "10.0.0.1");
        assert_eq!(value["userAgent"], "curl/8");
        assert_eq!(value["resourceId"], "42");
        assert_eq!(value["actorId"], "unknown");
    }
}
