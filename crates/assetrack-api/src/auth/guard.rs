//! Role and permission predicates over a resolved principal

use std::collections::BTreeSet;

use super::error::AuthError;
use crate::models::{Permission, Principal, Role};

/// Passes iff the principal's role is in the allowed set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleGuard {
    allowed: BTreeSet<Role>,
}

impl RoleGuard {
    pub fn new(allowed: impl IntoIterator<Item = Role>) -> Self {
        Self {
            allowed: allowed.into_iter().collect(),
        }
    }

    pub fn check(&self, principal: &Principal) -> Result<(), AuthError> {
        if self.allowed.contains(&principal.role) {
            Ok(())
        } else {
            Err(AuthError::InsufficientRole {
                allowed: self.allowed.iter().copied().collect(),
                actual: principal.role,
            })
        }
    }
}

/// Passes for admins unconditionally, otherwise iff every required
/// permission is held
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionGuard {
    required: BTreeSet<Permission>,
}

impl PermissionGuard {
    pub fn new(required: impl IntoIterator<Item = Permission>) -> Self {
        Self {
            required: required.into_iter().collect(),
        }
    }

    pub fn check(&self, principal: &Principal) -> Result<(), AuthError> {
        if principal.is_admin() {
            return Ok(());
        }
        let missing: Vec<Permission> = self
            .required
            .difference(&principal.permissions)
            .copied()
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(AuthError::InsufficientPermission { missing })
        }
    }
}

/// Guards a route declares. Both are optional and both must pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessPolicy {
    pub role: Option<RoleGuard>,
    pub permission: Option<PermissionGuard>,
}

impl AccessPolicy {
    /// Any active, authenticated principal
    pub fn authenticated() -> Self {
        Self::default()
    }

    pub fn roles(allowed: impl IntoIterator<Item = Role>) -> Self {
        Self {
            role: Some(RoleGuard::new(allowed)),
            permission: None,
        }
    }

    pub fn permissions(required: impl IntoIterator<Item = Permission>) -> Self {
        Self {
            role: None,
            permission: Some(PermissionGuard::new(required)),
        }
    }

    pub fn and_permissions(mut self, required: impl IntoIterator<Item = Permission>) -> Self {
        self.permission = Some(PermissionGuard::new(required));
        self
    }
}

pub fn ensure_active(principal: &Principal) -> Result<(), AuthError> {
    if principal.active {
        Ok(())
    } else {
        Err(AuthError::AccountDisabled)
    }
}

/// Evaluate a policy. The active check runs first and wins over any guard.
pub fn authorize(principal: Option<&Principal>, policy: &AccessPolicy) -> Result<(), AuthError> {
    let principal = principal.ok_or(AuthError::Unauthenticated)?;
    ensure_active(principal)?;

    if let Some(guard) = &policy.role {
        guard.check(principal)?;
    }
    if let Some(guard) = &policy.permission {
        guard.check(principal)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn principal(role: Role, permissions: &[Permission], active: bool) -> Principal {
        let mut p = Principal::provisioned("uid", "p@example.com", "P");
        p.role = role;
        p.permissions = permissions.iter().copied().collect();
        p.active = active;
        p
    }

    #[test]
    fn test_role_guard() {
        let guard = AccessPolicy::roles([Role::Admin]);
        assert!(matches!(
            authorize(Some(&principal(Role::Manager, &[], true)), &guard),
            Err(AuthError::InsufficientRole {
                actual: Role::Manager,
                ..
            })
        ));
        assert!(authorize(Some(&principal(Role::Admin, &[], true)), &guard).is_ok());
    }

    #[test]
    fn test_admin_bypasses_permission_guard() {
        let guard = AccessPolicy::permissions([Permission::Reports]);
        assert!(authorize(Some(&principal(Role::Admin, &[], true)), &guard).is_ok());

        let err = authorize(
            Some(&principal(Role::User, &[Permission::Read], true)),
            &guard,
        )
        .unwrap_err();
        assert!(
            matches!(err, AuthError::InsufficientPermission { ref missing } if missing == &[Permission::Reports])
        );
    }

    #[test]
    fn test_owner_is_not_implicitly_privileged() {
        let guard = AccessPolicy::permissions([Permission::Delete]);
        assert!(authorize(Some(&principal(Role::Owner, &[], true)), &guard).is_err());
    }

    #[test]
    fn test_inactive_always_disabled() {
        let policies = [
            AccessPolicy::authenticated(),
            AccessPolicy::roles([Role::Admin]),
            AccessPolicy::permissions([Permission::Reports]),
            AccessPolicy::roles([Role::User]).and_permissions([Permission::Read]),
        ];
        for role in Role::ALL {
            let inactive = principal(role, &Permission::ALL, false);
            for policy in &policies {
                assert!(matches!(
                    authorize(Some(&inactive), policy),
                    Err(AuthError::AccountDisabled)
                ));
            }
        }
    }

    #[test]
    fn test_missing_principal_is_unauthenticated() {
        assert!(matches!(
            authorize(None, &AccessPolicy::authenticated()),
            Err(AuthError::Unauthenticated)
        ));
    }
}
