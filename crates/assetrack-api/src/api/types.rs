//! Request and response bodies for the Assetrack API

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::auth::AuthScheme;
use crate::models::{Permission, Principal, Role};

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthCheckResponse {
    pub status: String,
    pub version: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub success: bool,
    pub token: String,
    /// Token lifetime in seconds
    pub expires_in: u64,
    pub user: Principal,
}

#[derive(Debug, Serialize)]
pub struct PrincipalResponse {
    pub success: bool,
    pub user: Principal,
}

#[derive(Debug, Serialize)]
pub struct CurrentUserResponse {
    pub success: bool,
    pub user: Principal,
    pub scheme: AuthScheme,
}

/// Self-service edit; role, permissions and activation are admin-only
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileEditRequest {
    pub display_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    /// Required once a password has been set
    #[serde(default)]
    pub current_password: Option<String>,
    pub new_password: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

impl MessageResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessReportResponse {
    pub success: bool,
    pub actor_id: String,
    pub role: Role,
    pub permissions: BTreeSet<Permission>,
    /// Admins pass every permission guard
    pub effective_permissions: BTreeSet<Permission>,
    pub scheme: AuthScheme,
}
