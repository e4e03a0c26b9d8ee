//! Identity route handlers: password sign-in and self-service profile

use axum::{extract::State, Json};
use serde_json::json;
use tracing::{info, warn};

use crate::{
    api::types::{
        ChangePasswordRequest, CurrentUserResponse, LoginRequest, LoginResponse, MessageResponse,
        PrincipalResponse, ProfileEditRequest,
    },
    auth::{
        password::{self, PasswordError},
        AuthError, AuthScheme, RequestContext,
    },
    error::{ApiError, Result},
    models::{AuditAction, AuditEvent, Principal, ProfileUpdate, RequestMeta},
    server::AppState,
};

/// Run CPU-heavy password work off the async workers
async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::Internal {
            message: format!("password task failed: {e}"),
        })
}

fn record_login_failure(
    state: &AppState,
    meta: &RequestMeta,
    principal: Option<&Principal>,
    reason: &str,
) {
    state.authenticator.audit().record(
        AuditEvent::new(AuditAction::LoginFailed, "auth", meta)
            .actor(principal)
            .details(json!({ "reason": reason })),
    );
}

/// Exchange email and password for a local token
pub async fn login(
    State(state): State<AppState>,
    meta: RequestMeta,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginResponse>> {
    let issuer = state
        .issuer
        .clone()
        .ok_or_else(|| state.reject(AuthError::ServiceMisconfigured))?;

    let found = state.principals.find_by_email(request.email.trim()).await?;
    let Some((principal, hash)) =
        found.and_then(|p| p.password_hash.clone().map(|hash| (p, hash)))
    else {
        record_login_failure(&state, &meta, None, "UNKNOWN_ACCOUNT");
        return Err(ApiError::InvalidCredentials);
    };

    let password = request.password;
    match blocking(move || password::verify_password(&password, &hash)).await? {
        Ok(()) => {}
        Err(PasswordError::Mismatch) => {
            record_login_failure(&state, &meta, Some(&principal), "BAD_PASSWORD");
            return Err(ApiError::InvalidCredentials);
        }
        Err(e) => {
            warn!("Stored password hash for {} is unusable: {}", principal.id, e);
            return Err(ApiError::Internal {
                message: e.to_string(),
            });
        }
    }

    if !principal.active {
        record_login_failure(&state, &meta, Some(&principal), "ACCOUNT_DISABLED");
        return Err(state.reject(AuthError::AccountDisabled));
    }

    let principal = state
        .principals
        .update_last_login(principal.id)
        .await?
        .unwrap_or(principal);
    let token = issuer.issue(&principal).map_err(|e| ApiError::Internal {
        message: format!("failed to sign token: {e}"),
    })?;

    state.authenticator.audit().record(
        AuditEvent::new(AuditAction::Login, "auth", &meta)
            .actor(Some(&principal))
            .details(json!({ "scheme": AuthScheme::LocalJwt.as_str() })),
    );
    info!("Password sign-in for principal {}", principal.id);

    Ok(Json(LoginResponse {
        success: true,
        token,
        expires_in: issuer.ttl().as_secs(),
        user: principal,
    }))
}

/// Current principal and the scheme it authenticated with
pub async fn me(context: RequestContext) -> Json<CurrentUserResponse> {
    Json(CurrentUserResponse {
        success: true,
        user: context.principal,
        scheme: context.scheme,
    })
}

pub async fn update_profile(
    State(state): State<AppState>,
    context: RequestContext,
    Json(request): Json<ProfileEditRequest>,
) -> Result<Json<PrincipalResponse>> {
    let display_name = request.display_name.trim();
    if display_name.is_empty() {
        return Err(ApiError::InvalidRequest {
            message: "displayName must not be empty".to_string(),
        });
    }

    let update = ProfileUpdate {
        display_name: Some(display_name.to_string()),
        ..Default::default()
    };
    let principal = state
        .principals
        .update_profile(context.principal.id, &update)
        .await?
        .ok_or_else(|| ApiError::NotFound {
            resource: "principal".to_string(),
        })?;

    state.authenticator.audit().record(
        AuditEvent::new(AuditAction::ProfileUpdated, "principals", &context.meta)
            .actor(Some(&context.principal))
            .resource_id(principal.id.to_string())
            .details(json!({ "fields": ["displayName"] })),
    );

    Ok(Json(PrincipalResponse {
        success: true,
        user: principal,
    }))
}

/// Set a new password. Stamps `passwordChangedAt`, which invalidates every
/// local token issued before the change.
pub async fn change_password(
    State(state): State<AppState>,
    context: RequestContext,
    Json(request): Json<ChangePasswordRequest>,
) -> Result<Json<MessageResponse>> {
    password::validate_new_password(&request.new_password).map_err(|e| {
        ApiError::InvalidRequest {
            message: e.to_string(),
        }
    })?;

    let current = state
        .principals
        .find_by_id(context.principal.id)
        .await?
        .ok_or_else(|| ApiError::NotFound {
            resource: "principal".to_string(),
        })?;

    if let Some(hash) = current.password_hash.clone() {
        let supplied = request.current_password.clone().unwrap_or_default();
        if blocking(move || password::verify_password(&supplied, &hash))
            .await?
            .is_err()
        {
            return Err(ApiError::InvalidCredentials);
        }
    }

    let new_password = request.new_password;
    let new_hash = blocking(move || password::hash_password(&new_password))
        .await?
        .map_err(|e| ApiError::Internal {
            message: e.to_string(),
        })?;

    state
        .principals
        .update_password(current.id, &new_hash)
        .await?
        .ok_or_else(|| ApiError::NotFound {
            resource: "principal".to_string(),
        })?;

    state.authenticator.audit().record(
        AuditEvent::new(AuditAction::PasswordChanged, "principals", &context.meta)
            .actor(Some(&current))
            .resource_id(current.id.to_string()),
    );

    Ok(Json(MessageResponse::ok(
        "Password updated; sign in again to obtain a new token",
    )))
}
