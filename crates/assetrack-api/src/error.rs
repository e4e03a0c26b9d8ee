//! Error types for the Assetrack API

use assetrack_common::AssetrackError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::auth::{AuthError, AuthRejection};
use crate::storage::StoreError;

/// Main error type for the Assetrack API
#[derive(Debug, Error)]
pub enum ApiError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] assetrack_common::ConfigurationError),

    /// Authentication or authorization rejection raised inside a handler.
    /// Built with [`AppState::reject`](crate::server::AppState::reject) so the
    /// body matches what the auth middleware renders.
    #[error("{}", .0.error)]
    Auth(AuthRejection),

    /// Store failure
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    /// Database connection error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Migration failure at startup
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Email/password sign-in failed
    #[error("Invalid email or password")]
    InvalidCredentials,

    /// Invalid request
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    /// Not found
    #[error("Resource not found: {resource}")]
    NotFound { resource: String },

    /// Internal server error
    #[error("Internal server error: {message}")]
    Internal { message: String },

    /// Other errors
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, ApiError>;

impl AssetrackError for ApiError {}

impl ApiError {
    /// Get error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::Config(_) => "ASSETRACK_API_CONFIG_ERROR",
            ApiError::Auth(rejection) => rejection.error.error_code(),
            ApiError::Store(_) => "ASSETRACK_API_STORAGE_ERROR",
            ApiError::Database(_) => "ASSETRACK_API_DATABASE_ERROR",
            ApiError::Migration(_) => "ASSETRACK_API_MIGRATION_ERROR",
            ApiError::InvalidCredentials => "ASSETRACK_API_INVALID_CREDENTIALS",
            ApiError::InvalidRequest { .. } => "ASSETRACK_API_INVALID_REQUEST",
            ApiError::NotFound { .. } => "ASSETRACK_API_NOT_FOUND",
            ApiError::Internal { .. } => "ASSETRACK_API_INTERNAL_ERROR",
            ApiError::Other(_) => "ASSETRACK_API_OTHER_ERROR",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Auth(rejection) => rejection.error.status_code(),
            ApiError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            ApiError::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
            ApiError::NotFound { .. } => StatusCode::NOT_FOUND,
            ApiError::Store(StoreError::DuplicateKey { .. }) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Check if error is a client error
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Auth(rejection) = self {
            return rejection.into_response();
        }

        let status = self.status_code();
        let message = match &self {
            ApiError::InvalidCredentials
            | ApiError::InvalidRequest { .. }
            | ApiError::NotFound { .. } => self.to_string(),
            ApiError::Store(StoreError::DuplicateKey { .. }) => {
                "Resource already exists".to_string()
            }
            _ => {
                tracing::error!(code = self.error_code(), "Request failed: {}", self);
                "Internal server error".to_string()
            }
        };

        (status, Json(json!({ "success": false, "message": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            ApiError::NotFound {
                resource: "principal".into()
            }
            .error_code(),
            "ASSETRACK_API_NOT_FOUND"
        );
        assert_eq!(
            ApiError::Auth(AuthError::AccountDisabled.with_details(false)).error_code(),
            "ACCOUNT_DISABLED"
        );
    }

    #[test]
    fn test_auth_errors_keep_their_status() {
        assert_eq!(
            ApiError::Auth(AuthError::UserNotFound.with_details(false)).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::Auth(AuthError::InsufficientPermission { missing: vec![] }.with_details(true))
                .status_code(),
            StatusCode::FORBIDDEN
        );
    }

    #[tokio::test]
    async fn test_auth_rejection_body_matches_middleware() {
        let rejection = AuthError::ServiceMisconfigured.with_details(true);
        let expected = rejection.body();

        let response = ApiError::Auth(rejection).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body, expected);
        assert_eq!(body["error"], "SERVICE_MISCONFIGURED");
    }

    #[test]
    fn test_client_errors() {
        assert!(ApiError::InvalidRequest {
            message: "test".to_string()
        }
        .is_client_error());
        assert!(!ApiError::Internal {
            message: "test".to_string()
        }
        .is_client_error());
    }
}
