//! API middleware stack

mod auth;

pub use auth::{auth_middleware, enforce_policy, PolicyState};

use crate::auth::AccessPolicy;
use crate::server::AppState;
use axum::{routing::MethodRouter, Router};
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::{DefaultMakeSpan, TraceLayer},
};

/// Apply the outer middleware stack to a router
pub fn apply_middleware(router: Router, state: &AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    router
        .layer(TimeoutLayer::new(state.config.request_timeout()))
        .layer(cors)
        .layer(TraceLayer::new_for_http().make_span_with(DefaultMakeSpan::default()))
}

/// Protect a single route with an access policy
pub fn guarded(
    route: MethodRouter<AppState>,
    state: &AppState,
    policy: AccessPolicy,
    resource: &'static str,
) -> MethodRouter<AppState> {
    route.route_layer(axum::middleware::from_fn_with_state(
        PolicyState::new(state, policy, resource),
        enforce_policy,
    ))
}
