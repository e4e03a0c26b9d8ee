//! Health check route

use axum::Json;
use chrono::Utc;

use crate::api::types::HealthCheckResponse;

/// Liveness probe; needs no credentials
pub async fn health_check() -> Json<HealthCheckResponse> {
    Json(HealthCheckResponse {
        status: "healthy".to_string(),
        version: crate::VERSION.to_string(),
        timestamp: Utc::now(),
    })
}
