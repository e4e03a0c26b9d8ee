use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use sqlx::{FromRow, PgPool};
use std::collections::{BTreeSet, HashMap};
use tracing::debug;
use uuid::Uuid;

use super::{StoreError, StoreResult};
use crate::models::{Permission, Principal, ProfileUpdate, Role};

pub const EXTERNAL_ID_CONSTRAINT: &str = "principals_external_id_key";
pub const EMAIL_CONSTRAINT: &str = "principals_email_key";

/// Principal persistence. Lookups that find nothing return `Ok(None)`.
#[async_trait]
pub trait PrincipalStore: Send + Sync {
    async fn find_by_external_id(&self, external_id: &str) -> StoreResult<Option<Principal>>;
    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<Principal>>;
    async fn find_by_email(&self, email: &str) -> StoreResult<Option<Principal>>;
    /// Fails with [`StoreError::DuplicateKey`] when `external_id` or `email` is taken
    async fn insert(&self, principal: &Principal) -> StoreResult<Principal>;
    async fn update_last_login(&self, id: Uuid) -> StoreResult<Option<Principal>>;
    async fn update_profile(
        &self,
        id: Uuid,
        update: &ProfileUpdate,
    ) -> StoreResult<Option<Principal>>;
    async fn update_password(&self, id: Uuid, password_hash: &str)
        -> StoreResult<Option<Principal>>;
}

#[derive(Debug, FromRow)]
struct PrincipalRow {
    id: Uuid,
    external_id: Option<String>,
    email: String,
    display_name: String,
    role: String,
    permissions: Vec<String>,
    active: bool,
    last_login_at: Option<DateTime<Utc>>,
    password_hash: Option<String>,
    password_changed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PrincipalRow> for Principal {
    type Error = StoreError;

    fn try_from(row: PrincipalRow) -> Result<Self, Self::Error> {
        let permissions = row
            .permissions
            .iter()
            .map(|p| p.parse::<Permission>())
            .collect::<Result<BTreeSet<_>, _>>()?;

        Ok(Principal {
            id: row.id,
            external_id: row.external_id,
            email: row.email,
            display_name: row.display_name,
            role: row.role.parse::<Role>()?,
            permissions,
            active: row.active,
            last_login_at: row.last_login_at,
            password_hash: row.password_hash,
            password_changed_at: row.password_changed_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn permission_tags(permissions: &BTreeSet<Permission>) -> Vec<String> {
    permissions.iter().map(|p| p.as_str().to_string()).collect()
}

/// PostgreSQL-backed principal store
#[derive(Clone)]
pub struct PgPrincipalStore {
    pool: PgPool,
}

impl PgPrincipalStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PrincipalStore for PgPrincipalStore {
    async fn find_by_external_id(&self, external_id: &str) -> StoreResult<Option<Principal>> {
        let row = sqlx::query_as::<_, PrincipalRow>(
            "SELECT * FROM principals WHERE external_id = $1",
        )
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::from_sqlx("find_by_external_id", e))?;

        row.map(Principal::try_from).transpose()
    }

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<Principal>> {
        let row = sqlx::query_as::<_, PrincipalRow>("SELECT * FROM principals WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::from_sqlx("find_by_id", e))?;

        row.map(Principal::try_from).transpose()
    }

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<Principal>> {
        let row = sqlx::query_as::<_, PrincipalRow>(
            "SELECT * FROM principals WHERE lower(email) = lower($1)",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::from_sqlx("find_by_email", e))?;

        row.map(Principal::try_from).transpose()
    }

    async fn insert(&self, principal: &Principal) -> StoreResult<Principal> {
        let row = sqlx::query_as::<_, PrincipalRow>(
            r#"
            INSERT INTO principals (
                id, external_id, email, display_name, role, permissions, active,
                last_login_at, password_hash, password_changed_at, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING *
            "#,
        )
        .bind(principal.id)
        .bind(&principal.external_id)
        .bind(&principal.email)
        .bind(&principal.display_name)
        .bind(principal.role.as_str())
        .bind(permission_tags(&principal.permissions))
        .bind(principal.active)
        .bind(principal.last_login_at)
        .bind(&principal.password_hash)
        .bind(principal.password_changed_at)
        .bind(principal.created_at)
        .bind(principal.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StoreError::from_sqlx("insert_principal", e))?;

        debug!("Inserted principal {}", row.id);
        Principal::try_from(row)
    }

    async fn update_last_login(&self, id: Uuid) -> StoreResult<Option<Principal>> {
        let row = sqlx::query_as::<_, PrincipalRow>(
            r#"
            UPDATE principals
            SET last_login_at = now(), updated_at = now()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::from_sqlx("update_last_login", e))?;

        row.map(Principal::try_from).transpose()
    }

    async fn update_profile(
        &self,
        id: Uuid,
        update: &ProfileUpdate,
    ) -> StoreResult<Option<Principal>> {
        let row = sqlx::query_as::<_, PrincipalRow>(
            r#"
            UPDATE principals
            SET display_name = COALESCE($2, display_name),
                role = COALESCE($3, role),
                permissions = COALESCE($4, permissions),
                active = COALESCE($5, active),
                updated_at = now()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&update.display_name)
        .bind(update.role.map(|r| r.as_str()))
        .bind(update.permissions.as_ref().map(permission_tags))
        .bind(update.active)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::from_sqlx("update_profile", e))?;

        row.map(Principal::try_from).transpose()
    }

    async fn update_password(
        &self,
        id: Uuid,
        password_hash: &str,
    ) -> StoreResult<Option<Principal>> {
        let row = sqlx::query_as::<_, PrincipalRow>(
            r#"
            UPDATE principals
            SET password_hash = $2, password_changed_at = now(), updated_at = now()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(password_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::from_sqlx("update_password", e))?;

        row.map(Principal::try_from).transpose()
    }
}

/// In-memory principal store enforcing the same uniqueness rules as the
/// database schema.
#[derive(Default)]
pub struct InMemoryPrincipalStore {
    principals: RwLock<HashMap<Uuid, Principal>>,
}

impl InMemoryPrincipalStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.principals.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.principals.read().is_empty()
    }

    fn modify(&self, id: Uuid, f: impl FnOnce(&mut Principal)) -> Option<Principal> {
        let mut principals = self.principals.write();
        let principal = principals.get_mut(&id)?;
        f(principal);
        Some(principal.clone())
    }
}

#[async_trait]
impl PrincipalStore for InMemoryPrincipalStore {
    async fn find_by_external_id(&self, external_id: &str) -> StoreResult<Option<Principal>> {
        Ok(self
            .principals
            .read()
            .values()
            .find(|p| p.external_id.as_deref() == Some(external_id))
            .cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<Principal>> {
        Ok(self.principals.read().get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<Principal>> {
        Ok(self
            .principals
            .read()
            .values()
            .find(|p| p.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn insert(&self, principal: &Principal) -> StoreResult<Principal> {
        let mut principals = self.principals.write();

        for existing in principals.values() {
            if principal.external_id.is_some() && existing.external_id == principal.external_id {
                return Err(StoreError::DuplicateKey {
                    constraint: EXTERNAL_ID_CONSTRAINT.to_string(),
                });
            }
            if existing.email.eq_ignore_ascii_case(&principal.email) {
                return Err(StoreError::DuplicateKey {
                    constraint: EMAIL_CONSTRAINT.to_string(),
                });
            }
        }
        if principals.contains_key(&principal.id) {
            return Err(StoreError::DuplicateKey {
                constraint: "principals_pkey".to_string(),
            });
        }

        principals.insert(principal.id, principal.clone());
        Ok(principal.clone())
    }

    async fn update_last_login(&self, id: Uuid) -> StoreResult<Option<Principal>> {
        Ok(self.modify(id, |p| {
            let now = Utc::now();
            p.last_login_at = Some(now);
            p.updated_at = now;
        }))
    }

    async fn update_profile(
        &self,
        id: Uuid,
        update: &ProfileUpdate,
    ) -> StoreResult<Option<Principal>> {
        Ok(self.modify(id, |p| update.apply_to(p)))
    }

    async fn update_password(
        &self,
        id: Uuid,
        password_hash: &str,
    ) -> StoreResult<Option<Principal>> {
        Ok(self.modify(id, |p| {
            let now = Utc::now();
            p.password_hash = Some(password_hash.to_string());
            p.password_changed_at = Some(now);
            p.updated_at = now;
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_insert_rejects_duplicate_external_id() {
        let store = InMemoryPrincipalStore::new();
        store
            .insert(&Principal::provisioned("uid-1", "a@example.com", "A"))
            .await
            .unwrap();

        let err = store
            .insert(&Principal::provisioned("uid-1", "b@example.com", "B"))
            .await
            .unwrap_err();
        assert!(err.is_duplicate_key());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_insert_rejects_duplicate_email_case_insensitive() {
        let store = InMemoryPrincipalStore::new();
        store
            .insert(&Principal::provisioned("uid-1", "a@example.com", "A"))
            .await
            .unwrap();

        let err = store
            .insert(&Principal::provisioned("uid-2", "A@Example.com", "A2"))
            .await
            .unwrap_err();
        assert!(
            matches!(err, StoreError::DuplicateKey { ref constraint } if constraint == EMAIL_CONSTRAINT)
        );
    }

    #[tokio::test]
    async fn test_not_found_is_none() {
        let store = InMemoryPrincipalStore::new();
        assert!(store.find_by_id(Uuid::new_v4()).await.unwrap().is_none());
        assert!(store.find_by_external_id("nobody").await.unwrap().is_none());
        assert!(store
            .update_last_login(Uuid::new_v4())
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_update_password_stamps_change_time() {
        let store = InMemoryPrincipalStore::new();
        let principal = store
            .insert(&Principal::provisioned("uid-1", "a@example.com", "A"))
            .await
            .unwrap();
        assert!(principal.password_changed_at.is_none());

        let updated = store
            .update_password(principal.id, "$argon2id$hash")
            .await
            .unwrap()
            .unwrap();
        assert!(updated.password_changed_at.is_some());
        assert_eq!(updated.password_hash.as_deref(), Some("$argon2id$hash"));
    }

    #[test]
    fn test_row_with_unknown_role_is_corrupt() {
        let now = Utc::now();
        let row = PrincipalRow {
            id: Uuid::new_v4(),
            external_id: None,
            email: "a@example.com".to_string(),
            display_name: "A".to_string(),
            role: "superuser".to_string(),
            permissions: vec!["read".to_string()],
            active: true,
            last_login_at: None,
            password_hash: None,
            password_changed_at: None,
            created_at: now,
            updated_at: now,
        };
        assert!(matches!(
            Principal::try_from(row),
            Err(StoreError::CorruptRow(_))
        ));
    }
}
