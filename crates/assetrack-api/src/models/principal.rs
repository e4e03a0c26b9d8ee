//! Principal: the locally persisted identity behind every authenticated request

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Error for unknown role or permission tags coming from storage or requests
#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown {kind} '{value}'")]
pub struct UnknownTag {
    pub kind: &'static str,
    pub value: String,
}

/// Coarse-grained role
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Manager,
    Admin,
    Owner,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::User, Role::Manager, Role::Admin, Role::Owner];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Manager => "manager",
            Role::Admin => "admin",
            Role::Owner => "owner",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = UnknownTag;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|role| role.as_str() == s)
            .ok_or_else(|| UnknownTag {
                kind: "role",
                value: s.to_string(),
            })
    }
}

/// Capability tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    Read,
    Create,
    Update,
    Delete,
    Assign,
    Reports,
}

impl Permission {
    pub const ALL: [Permission; 6] = [
        Permission::Read,
        Permission::Create,
        Permission::Update,
        Permission::Delete,
        Permission::Assign,
        Permission::Reports,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::Read => "read",
            Permission::Create => "create",
            Permission::Update => "update",
            Permission::Delete => "delete",
            Permission::Assign => "assign",
            Permission::Reports => "reports",
        }
    }

    /// Every capability, as granted to demo administrators
    pub fn all() -> BTreeSet<Permission> {
        Permission::ALL.into_iter().collect()
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Permission {
    type Err = UnknownTag;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Permission::ALL
            .into_iter()
            .find(|perm| perm.as_str() == s)
            .ok_or_else(|| UnknownTag {
                kind: "permission",
                value: s.to_string(),
            })
    }
}

/// A locally persisted identity.
///
/// `external_id` links to the remote identity provider's subject and is unique
/// when present; `email` is always unique. Principals are deactivated, never
/// deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Principal {
    pub id: Uuid,
    pub external_id: Option<String>,
    pub email: String,
    pub display_name: String,
    pub role: Role,
    pub permissions: BTreeSet<Permission>,
    pub active: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    pub password_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password_changed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Principal {
    /// A first-time principal for a verified remote identity
    pub fn provisioned(external_id: &str, email: &str, display_name: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            external_id: Some(external_id.to_string()),
            email: email.to_string(),
            display_name: display_name.to_string(),
            role: Role::User,
            permissions: BTreeSet::from([Permission::Read]),
            active: true,
            last_login_at: Some(now),
            password_hash: None,
            password_changed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Identifier used for audit records: external id first, then local id
    pub fn audit_actor_id(&self) -> String {
        self.external_id
            .clone()
            .unwrap_or_else(|| self.id.to_string())
    }
}

/// Self-service profile fields
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    pub display_name: Option<String>,
    pub role: Option<Role>,
    pub permissions: Option<BTreeSet<Permission>>,
    pub active: Option<bool>,
}

impl ProfileUpdate {
    pub fn is_empty(&self) -> bool {
        self.display_name.is_none()
            && self.role.is_none()
            && self.permissions.is_none()
            && self.active.is_none()
    }

    /// Apply to a principal in place, bumping `updated_at`
    pub fn apply_to(&self, principal: &mut Principal) {
        if let Some(name) = &self.display_name {
            principal.display_name = name.clone();
        }
        if let Some(role) = self.role {
            principal.role = role;
        }
        if let Some(permissions) = &self.permissions {
            principal.permissions = permissions.clone();
        }
        if let Some(active) = self.active {
            principal.active = active;
        }
        principal.updated_at = Utc::now();
    }
}
