use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::{
    api::types::PrincipalResponse,
    auth::{AuthError, RequestContext},
    error::{ApiError, Result},
    models::{AuditAction, AuditEvent, ProfileUpdate, Role},
    server::AppState,
};

/// Administrative edit of another principal's profile, role, permissions or
/// activation. Principals are deactivated here, never deleted.
pub async fn update_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    context: RequestContext,
    Json(update): Json<ProfileUpdate>,
) -> Result<Json<PrincipalResponse>> {
    if update.is_empty() {
        return Err(ApiError::InvalidRequest {
            message: "no fields to update".to_string(),
        });
    }
    if update
        .display_name
        .as_deref()
        .is_some_and(|name| name.trim().is_empty())
    {
        return Err(ApiError::InvalidRequest {
            message: "displayName must not be empty".to_string(),
        });
    }

    let caller = &context.principal;
    if update.active == Some(false) && caller.id == id {
        return Err(ApiError::InvalidRequest {
            message: "cannot deactivate your own account".to_string(),
        });
    }

    let target = state
        .principals
        .find_by_id(id)
        .await?
        .ok_or_else(|| ApiError::NotFound {
            resource: format!("principal {id}"),
        })?;

    // Only an owner may grant the owner role or change an owner's access
    let touches_access =
        update.role.is_some() || update.permissions.is_some() || update.active.is_some();
    let owner_stake =
        update.role == Some(Role::Owner) || (target.role == Role::Owner && touches_access);
    if owner_stake && caller.role != Role::Owner {
        return Err(state.reject(AuthError::InsufficientRole {
            allowed: vec![Role::Owner],
            actual: caller.role,
        }));
    }

    let principal = state
        .principals
        .update_profile(id, &update)
        .await?
        .ok_or_else(|| ApiError::NotFound {
            resource: format!("principal {id}"),
        })?;

    info!(
        target_id = %principal.id,
        actor = %caller.id,
        "Principal updated by administrator"
    );
    state.authenticator.audit().record(
        AuditEvent::new(AuditAction::ProfileUpdated, "users", &context.meta)
            .actor(Some(caller))
            .resource_id(principal.id.to_string())
            .details(json!({ "update": update })),
    );

    Ok(Json(PrincipalResponse {
        success: true,
        user: principal,
    }))
}
