//! Rejection taxonomy shared by every stage of the auth pipeline
//!
//! Verifier-specific failures ([`RemoteFailure`], [`LocalFailure`]) are
//! mapped into [`AuthError`] exactly once, through the `From` impls below.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use thiserror::Error;

use super::firebase::RemoteFailure;
use super::local_jwt::LocalFailure;
use crate::models::{Permission, Role};
use crate::storage::StoreError;

/// Why a request was not allowed through
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("no bearer credentials supplied")]
    MissingCredentials,

    #[error("token does not match any known scheme")]
    UnknownScheme,

    #[error("remote identity verification failed: {0}")]
    RemoteVerificationFailed(RemoteFailure),

    #[error("local token verification failed: {0}")]
    LocalVerificationFailed(LocalFailure),

    #[error("local token secret is not configured")]
    ServiceMisconfigured,

    #[error("no principal matches the token subject")]
    UserNotFound,

    #[error("route requires an authenticated principal")]
    Unauthenticated,

    #[error("account is disabled")]
    AccountDisabled,

    #[error("role '{actual}' is not one of {allowed:?}")]
    InsufficientRole { allowed: Vec<Role>, actual: Role },

    #[error("missing permissions {missing:?}")]
    InsufficientPermission { missing: Vec<Permission> },

    /// A verified remote identity collides with a principal it does not own
    #[error("provisioning conflict on {constraint}")]
    ProvisioningConflict { constraint: String },

    #[error("internal error: {0}")]
    Internal(String),
}

impl AuthError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::MissingCredentials
            | AuthError::UnknownScheme
            | AuthError::LocalVerificationFailed(_)
            | AuthError::UserNotFound
            | AuthError::Unauthenticated => StatusCode::UNAUTHORIZED,
            AuthError::RemoteVerificationFailed(RemoteFailure::ServiceUnavailable) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            AuthError::RemoteVerificationFailed(_) => StatusCode::UNAUTHORIZED,
            AuthError::ServiceMisconfigured => StatusCode::SERVICE_UNAVAILABLE,
            AuthError::AccountDisabled
            | AuthError::InsufficientRole { .. }
            | AuthError::InsufficientPermission { .. } => StatusCode::FORBIDDEN,
            AuthError::ProvisioningConflict { .. } => StatusCode::CONFLICT,
            AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code, also used as the audit reason
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::MissingCredentials => "MISSING_CREDENTIALS",
            AuthError::UnknownScheme => "UNKNOWN_SCHEME",
            AuthError::RemoteVerificationFailed(failure) => match failure {
                RemoteFailure::Expired => "REMOTE_TOKEN_EXPIRED",
                RemoteFailure::Revoked => "REMOTE_TOKEN_REVOKED",
                RemoteFailure::InvalidSignature => "REMOTE_INVALID_SIGNATURE",
                RemoteFailure::ServiceUnavailable => "REMOTE_SERVICE_UNAVAILABLE",
            },
            AuthError::LocalVerificationFailed(failure) => match failure {
                LocalFailure::Malformed => "LOCAL_TOKEN_MALFORMED",
                LocalFailure::Expired => "LOCAL_TOKEN_EXPIRED",
                LocalFailure::StaleCredentials => "STALE_CREDENTIALS",
            },
            AuthError::ServiceMisconfigured => "SERVICE_MISCONFIGURED",
            AuthError::UserNotFound => "USER_NOT_FOUND",
            AuthError::Unauthenticated => "UNAUTHENTICATED",
            AuthError::AccountDisabled => "ACCOUNT_DISABLED",
            AuthError::InsufficientRole { .. } => "INSUFFICIENT_ROLE",
            AuthError::InsufficientPermission { .. } => "INSUFFICIENT_PERMISSION",
            AuthError::ProvisioningConflict { .. } => "PROVISIONING_CONFLICT",
            AuthError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Client-facing message; never leaks internals
    pub fn message(&self) -> &'static str {
        match self {
            AuthError::MissingCredentials | AuthError::Unauthenticated => {
                "Authentication required"
            }
            AuthError::UnknownScheme => "Invalid token format",
            AuthError::RemoteVerificationFailed(RemoteFailure::Expired)
            | AuthError::LocalVerificationFailed(LocalFailure::Expired) => "Token expired",
            AuthError::RemoteVerificationFailed(RemoteFailure::Revoked) => "Token revoked",
            AuthError::RemoteVerificationFailed(RemoteFailure::InvalidSignature)
            | AuthError::LocalVerificationFailed(LocalFailure::Malformed) => "Invalid token",
            AuthError::RemoteVerificationFailed(RemoteFailure::ServiceUnavailable) => {
                "Authentication service unavailable"
            }
            AuthError::LocalVerificationFailed(LocalFailure::StaleCredentials) => {
                "Credentials changed, please sign in again"
            }
            AuthError::ServiceMisconfigured => "Authentication service misconfigured",
            AuthError::UserNotFound => "User not found",
            AuthError::AccountDisabled => "Account is disabled",
            AuthError::InsufficientRole { .. } => "Insufficient role",
            AuthError::InsufficientPermission { .. } => "Insufficient permissions",
            AuthError::ProvisioningConflict { .. } => "Account conflicts with an existing user",
            AuthError::Internal(_) => "Internal server error",
        }
    }

    /// Authorization failures, as opposed to authentication failures
    pub fn is_forbidden(&self) -> bool {
        self.status_code() == StatusCode::FORBIDDEN
    }

    pub fn with_details(self, expose_details: bool) -> AuthRejection {
        AuthRejection {
            error: self,
            expose_details,
        }
    }
}

impl From<RemoteFailure> for AuthError {
    fn from(failure: RemoteFailure) -> Self {
        AuthError::RemoteVerificationFailed(failure)
    }
}

impl From<LocalFailure> for AuthError {
    fn from(failure: LocalFailure) -> Self {
        AuthError::LocalVerificationFailed(failure)
    }
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        AuthError::Internal(err.to_string())
    }
}

/// An [`AuthError`] on its way out as an HTTP response.
///
/// In development mode the body also carries the stable `error` code and the
/// internal `details`.
#[derive(Debug)]
pub struct AuthRejection {
    pub error: AuthError,
    pub expose_details: bool,
}

impl AuthRejection {
    pub fn body(&self) -> Value {
        let mut body = json!({
            "success": false,
            "message": self.error.message(),
        });
        if self.expose_details {
            body["error"] = json!(self.error.error_code());
            body["details"] = json!(self.error.to_string());
        }
        body
    }
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        (self.error.status_code(), Json(self.body())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_status_codes_separate_authn_from_authz() {
        assert_eq!(
            AuthError::MissingCredentials.status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AuthError::AccountDisabled.status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AuthError::InsufficientRole {
                allowed: vec![Role::Admin],
                actual: Role::Manager,
            }
            .status_code(),
            StatusCode::FORBIDDEN
        );
        assert!(!AuthError::UserNotFound.is_forbidden());
    }

    #[test]
    fn test_remote_outage_is_503() {
        let err = AuthError::from(RemoteFailure::ServiceUnavailable);
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            AuthError::from(RemoteFailure::Revoked).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AuthError::ServiceMisconfigured.status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_body_hides_details_outside_development() {
        let rejection = AuthError::Internal("pool timed out".into()).with_details(false);
        assert_eq!(
            rejection.body(),
            json!({"success": false, "message": "Internal server error"})
        );

        let rejection = AuthError::Internal("pool timed out".into()).with_details(true);
        let body = rejection.body();
        assert_eq!(body["error"], "INTERNAL_ERROR");
        assert_eq!(body["details"], "internal error: pool timed out");
    }

    #[test]
    fn test_missing_credentials_message() {
        let body = AuthError::MissingCredentials.with_details(false).body();
        assert_eq!(body["message"], "Authentication required");
        assert_eq!(body["success"], false);
    }
}
