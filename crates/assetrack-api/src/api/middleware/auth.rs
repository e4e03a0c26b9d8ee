//! Bearer authentication and per-route access policies

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::debug;

use crate::{
    auth::{bearer_token, request_meta, AccessPolicy, AuthError, AuthRejection, Authenticator, RequestContext},
    server::AppState,
};

/// Authenticate the bearer token and attach a [`RequestContext`].
///
/// The pipeline runs on its own task so that provisioning and audit writes
/// finish even when the client disconnects mid-request.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AuthRejection> {
    let token = bearer_token(req.headers()).map(str::to_string);
    let meta = request_meta(req.headers(), req.extensions());
    let authenticator = state.authenticator.clone();
    let expose_details = authenticator.development_mode();

    let outcome = tokio::spawn(async move { authenticator.authenticate(token.as_deref(), meta).await })
        .await
        .map_err(|e| AuthError::Internal(format!("authentication task failed: {e}")))
        .and_then(|result| result);

    match outcome {
        Ok(context) => {
            debug!(
                "Authenticated principal {} via {}",
                context.principal.id, context.scheme
            );
            req.extensions_mut().insert(context);
            Ok(next.run(req).await)
        }
        Err(e) => Err(e.with_details(expose_details)),
    }
}

/// State for [`enforce_policy`]: the guards one route declares
#[derive(Clone)]
pub struct PolicyState {
    pub authenticator: Arc<Authenticator>,
    pub policy: Arc<AccessPolicy>,
    pub resource: &'static str,
}

impl PolicyState {
    pub fn new(state: &AppState, policy: AccessPolicy, resource: &'static str) -> Self {
        Self {
            authenticator: state.authenticator.clone(),
            policy: Arc::new(policy),
            resource,
        }
    }
}

/// Evaluate a route's guards before its handler runs
pub async fn enforce_policy(
    State(guard): State<PolicyState>,
    req: Request,
    next: Next,
) -> Result<Response, AuthRejection> {
    let context = req.extensions().get::<RequestContext>();
    guard
        .authenticator
        .authorize(context, &guard.policy, guard.resource)
        .map_err(|e| e.with_details(guard.authenticator.development_mode()))?;

    Ok(next.run(req).await)
}
