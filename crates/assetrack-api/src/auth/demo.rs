//! Development-only sentinel tokens.
//!
//! The sentinels exist only in builds with the `demo-tokens` feature, and are
//! honoured only while `auth.development_mode` is on. The feature is off by
//! default; local runs opt in with `--features demo-tokens`.

use chrono::{TimeZone, Utc};
use std::collections::BTreeSet;
use uuid::Uuid;

use crate::models::{Permission, Principal, Role};

#[cfg(feature = "demo-tokens")]
pub const DEMO_ADMIN_TOKEN: &str = "demo-admin-token";
#[cfg(feature = "demo-tokens")]
pub const DEMO_USER_TOKEN: &str = "demo-user-token";

const DEMO_ADMIN_ID: Uuid = Uuid::from_u128(0x00000000_0000_4000_8000_00000000d001);
const DEMO_USER_ID: Uuid = Uuid::from_u128(0x00000000_0000_4000_8000_00000000d002);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DemoToken {
    Admin,
    User,
}

impl DemoToken {
    /// Synthetic principal; never read from or written to a store
    pub fn principal(&self) -> Principal {
        let epoch = Utc.timestamp_opt(0, 0).single().unwrap_or_else(Utc::now);
        let (id, email, name, role, permissions) = match self {
            DemoToken::Admin => (
                DEMO_ADMIN_ID,
                "demo-admin@assetrack.local",
                "Demo Admin",
                Role::Admin,
                Permission::all(),
            ),
            DemoToken::User => (
                DEMO_USER_ID,
                "demo-user@assetrack.local",
                "Demo User",
                Role::User,
                BTreeSet::from([Permission::Read]),
            ),
        };

        Principal {
            id,
            external_id: None,
            email: email.to_string(),
            display_name: name.to_string(),
            role,
            permissions,
            active: true,
            last_login_at: None,
            password_hash: None,
            password_changed_at: None,
            created_at: epoch,
            updated_at: epoch,
        }
    }
}

/// Literal comparison against the sentinels
#[cfg(feature = "demo-tokens")]
pub fn recognize(token: &str, development_mode: bool) -> Option<DemoToken> {
    if !development_mode {
        return None;
    }
    match token {
        DEMO_ADMIN_TOKEN => Some(DemoToken::Admin),
        DEMO_USER_TOKEN => Some(DemoToken::User),
        _ => None,
    }
}

#[cfg(not(feature = "demo-tokens"))]
pub fn recognize(_token: &str, _development_mode: bool) -> Option<DemoToken> {
    None
}
