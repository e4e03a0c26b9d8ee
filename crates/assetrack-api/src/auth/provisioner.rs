//! Maps verified remote identities onto local principals

use std::sync::Arc;
use tracing::{debug, info, warn};

use super::error::AuthError;
use super::firebase::RemoteIdentity;
use crate::models::Principal;
use crate::storage::{PrincipalStore, StoreError};

/// Result of provisioning, telling callers whether a row was created
#[derive(Debug, Clone)]
pub struct Provisioned {
    pub principal: Principal,
    pub created: bool,
}

/// Finds or creates the principal for a remote identity.
///
/// Concurrent first logins for the same subject are resolved by the store's
/// unique constraint on `external_id`, not by an in-process lock: the loser
/// of the insert race re-reads the winner's row.
pub struct UserProvisioner {
    principals: Arc<dyn PrincipalStore>,
}

impl UserProvisioner {
    pub fn new(principals: Arc<dyn PrincipalStore>) -> Self {
        Self { principals }
    }

    pub async fn provision(&self, identity: &RemoteIdentity) -> Result<Provisioned, AuthError> {
        if let Some(existing) = self
            .principals
            .find_by_external_id(&identity.external_id)
            .await?
        {
            return self.touch(existing).await;
        }

        let candidate = Principal::provisioned(
            &identity.external_id,
            &identity.email,
            &identity.display_name,
        );

        match self.principals.insert(&candidate).await {
            Ok(principal) => {
                info!(
                    "Provisioned principal {} for external id {}",
                    principal.id, identity.external_id
                );
                Ok(Provisioned {
                    principal,
                    created: true,
                })
            }
            Err(StoreError::DuplicateKey { constraint }) => {
                debug!(
                    "Insert for {} lost a race on {}; re-reading",
                    identity.external_id, constraint
                );
                match self
                    .principals
                    .find_by_external_id(&identity.external_id)
                    .await?
                {
                    Some(existing) => self.touch(existing).await,
                    None => {
                        warn!(
                            "External id {} collides with another principal on {}",
                            identity.external_id, constraint
                        );
                        Err(AuthError::ProvisioningConflict { constraint })
                    }
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn touch(&self, existing: Principal) -> Result<Provisioned, AuthError> {
        // The row can vanish only through out-of-band deletes; keep what we read
        let principal = self
            .principals
            .update_last_login(existing.id)
            .await?
            .unwrap_or(existing);
        Ok(Provisioned {
            principal,
            created: false,
        })
    }
}
