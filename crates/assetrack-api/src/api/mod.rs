//! HTTP surface of the Assetrack API

pub mod middleware;
pub mod routes;
pub mod types;

use crate::auth::AccessPolicy;
use crate::models::{Permission, Role};
use crate::server::AppState;
use axum::{
    routing::{get, post, put},
    Router,
};
use middleware::guarded;

/// Build the full router.
///
/// Everything except `/health` and `/api/auth/login` sits behind bearer
/// authentication; individual routes add role or permission guards on top.
pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/api/auth/me", get(routes::auth::me))
        .route("/api/auth/profile", put(routes::auth::update_profile))
        .route("/api/auth/password", post(routes::auth::change_password))
        .route(
            "/api/users/:id",
            guarded(
                put(routes::users::update_user),
                &state,
                AccessPolicy::roles([Role::Admin, Role::Owner]),
                "users",
            ),
        )
        .route(
            "/api/reports/access",
            guarded(
                get(routes::reports::access_report),
                &state,
                AccessPolicy::permissions([Permission::Reports]),
                "reports",
            ),
        )
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth_middleware,
        ));

    let router = Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/api/auth/login", post(routes::auth::login))
        .merge(protected)
        .with_state(state.clone());

    middleware::apply_middleware(router, &state)
}
