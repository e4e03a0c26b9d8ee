//! The authentication and authorization pipeline
//!
//! ```text
//! Unauthenticated -> Classified -> Verifying -> Provisioned -> Authorized
//!        \______________\______________\______________\______> Rejected
//! ```
//!
//! Stages run strictly in sequence for one request. A token classified as
//! remote-identity is only ever checked by the remote verifier; if that
//! fails the request is rejected and the local verifier is never consulted.

use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info};

use super::audit::AuditSink;
use super::classifier::{classify, ClassifierSettings, TokenClass};
use super::context::{AuthScheme, RequestContext};
use super::error::AuthError;
use super::firebase::FirebaseVerifier;
use super::guard::{self, AccessPolicy};
use super::local_jwt::LocalVerifier;
use super::provisioner::UserProvisioner;
use crate::models::{AuditAction, AuditEvent, Principal, RequestMeta};
use crate::storage::PrincipalStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStage {
    Unauthenticated,
    Classified,
    Verifying,
    Provisioned,
    Authorized,
    Rejected,
}

/// A failed pipeline run and, when one was resolved, the principal involved
struct Rejection {
    error: AuthError,
    principal: Option<Principal>,
}

impl From<AuthError> for Rejection {
    fn from(error: AuthError) -> Self {
        Self {
            error,
            principal: None,
        }
    }
}

fn transition(from: AuthStage, to: AuthStage) {
    debug!(?from, ?to, "auth pipeline transition");
}

/// Stage a classified token moves to next. Demo tokens skip verification.
fn next_stage(class: &TokenClass) -> AuthStage {
    match class {
        TokenClass::Demo(_) => AuthStage::Classified,
        TokenClass::RemoteIdentity | TokenClass::LocalJwt => AuthStage::Verifying,
        TokenClass::Unknown => AuthStage::Rejected,
    }
}

/// Drives classification, verification, provisioning and authorization
pub struct Authenticator {
    settings: ClassifierSettings,
    remote: FirebaseVerifier,
    local: Arc<dyn LocalVerifier>,
    provisioner: UserProvisioner,
    audit: AuditSink,
}

impl Authenticator {
    pub fn new(
        settings: ClassifierSettings,
        remote: FirebaseVerifier,
        local: Arc<dyn LocalVerifier>,
        principals: Arc<dyn PrincipalStore>,
        audit: AuditSink,
    ) -> Self {
        Self {
            settings,
            remote,
            local,
            provisioner: UserProvisioner::new(principals),
            audit,
        }
    }

    pub fn development_mode(&self) -> bool {
        self.settings.development_mode
    }

    pub fn audit(&self) -> &AuditSink {
        &self.audit
    }

    /// Resolve bearer credentials into a request context.
    ///
    /// Inactive principals are rejected here even when the route declares no
    /// guard. Every rejection other than absent credentials is audited.
    pub async fn authenticate(
        &self,
        token: Option<&str>,
        meta: RequestMeta,
    ) -> Result<RequestContext, AuthError> {
        match self.resolve(token, &meta).await {
            Ok(context) => Ok(context),
            Err(Rejection { error, principal }) => {
                debug!(
                    stage = ?AuthStage::Rejected,
                    reason = error.error_code(),
                    "authentication rejected"
                );
                if !matches!(error, AuthError::MissingCredentials) {
                    self.audit.record(
                        AuditEvent::new(AuditAction::AuthenticationRejected, "auth", &meta)
                            .actor(principal.as_ref())
                            .details(json!({ "reason": error.error_code() })),
                    );
                }
                Err(error)
            }
        }
    }

    async fn resolve(
        &self,
        token: Option<&str>,
        meta: &RequestMeta,
    ) -> Result<RequestContext, Rejection> {
        let token = token.ok_or(AuthError::MissingCredentials)?;

        let envelope = classify(token, &self.settings);
        transition(AuthStage::Unauthenticated, AuthStage::Classified);
        debug!(class = ?envelope.class, "bearer token classified");

        let stage = next_stage(&envelope.class);
        if stage == AuthStage::Verifying {
            transition(AuthStage::Classified, AuthStage::Verifying);
        }

        let (principal, scheme) = match envelope.class {
            TokenClass::Demo(demo) => (demo.principal(), AuthScheme::Demo),
            TokenClass::RemoteIdentity => {
                let identity = self.remote.verify(token).await.map_err(AuthError::from)?;
                let provisioned = self.provisioner.provision(&identity).await?;

                if provisioned.created {
                    self.audit.record(
                        AuditEvent::new(AuditAction::UserProvisioned, "principals", meta)
                            .actor(Some(&provisioned.principal))
                            .resource_id(provisioned.principal.id.to_string())
                            .details(json!({ "email": provisioned.principal.email })),
                    );
                }
                if provisioned.principal.active {
                    self.audit.record(
                        AuditEvent::new(AuditAction::Login, "auth", meta)
                            .actor(Some(&provisioned.principal))
                            .details(json!({ "scheme": AuthScheme::RemoteIdentity.as_str() })),
                    );
                }
                (provisioned.principal, AuthScheme::RemoteIdentity)
            }
            TokenClass::LocalJwt => {
                let verified = self.local.verify(token).await?;
                (verified.principal, AuthScheme::LocalJwt)
            }
            TokenClass::Unknown => return Err(AuthError::UnknownScheme.into()),
        };

        if let Err(error) = guard::ensure_active(&principal) {
            return Err(Rejection {
                error,
                principal: Some(principal),
            });
        }

        transition(stage, AuthStage::Provisioned);
        Ok(RequestContext {
            principal,
            scheme,
            raw_token: token.to_string(),
            meta: meta.clone(),
        })
    }

    /// Evaluate a route's policy; denials are audited.
    pub fn authorize(
        &self,
        context: Option<&RequestContext>,
        policy: &AccessPolicy,
        resource: &str,
    ) -> Result<(), AuthError> {
        let principal = context.map(|c| &c.principal);
        match guard::authorize(principal, policy) {
            Ok(()) => {
                transition(AuthStage::Provisioned, AuthStage::Authorized);
                Ok(())
            }
            Err(error) => {
                info!(
                    actor = ?principal.map(Principal::audit_actor_id),
                    resource,
                    reason = error.error_code(),
                    "access denied"
                );
                let meta = context.map(|c| c.meta.clone()).unwrap_or_default();
                self.audit.record(
                    AuditEvent::new(AuditAction::AccessDenied, resource, &meta)
                        .actor(principal)
                        .details(json!({ "reason": error.error_code() })),
                );
                Err(error)
            }
        }
    }
}
