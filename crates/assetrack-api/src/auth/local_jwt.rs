//! Locally issued JWTs
//!
//! Verification tries a fixed list of algorithms against the shared secret.
//! The list is a constant and [`verify_signature`] is pure, so the cycling
//! behaviour is testable without a store or network.

use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, TokenData,
    Validation,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument};
use uuid::Uuid;

use super::error::AuthError;
use crate::models::Principal;
use crate::storage::PrincipalStore;

/// Order in which signature algorithms are attempted
pub const ALGORITHM_PRIORITY: [Algorithm; 3] = [Algorithm::HS256, Algorithm::HS512, Algorithm::RS256];

/// Local verification failures, before mapping into [`AuthError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LocalFailure {
    #[error("malformed")]
    Malformed,
    #[error("expired")]
    Expired,
    #[error("stale-credentials")]
    StaleCredentials,
}

/// Claims carried by a local token. The subject may appear under any of
/// `id`, `sub` or `userId`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalClaims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<Value>,
    #[serde(default, rename = "userId", skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    pub iat: i64,
    pub exp: i64,
}

impl LocalClaims {
    /// First present of `id`, `sub`, `userId`, rendered as a string
    pub fn subject(&self) -> Option<String> {
        [&self.id, &self.sub, &self.user_id]
            .into_iter()
            .flatten()
            .find_map(|value| match value {
                Value::String(s) if !s.is_empty() => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
    }
}

/// Try each algorithm in [`ALGORITHM_PRIORITY`]; the first that verifies wins.
///
/// An `RS256` attempt is skipped unless the secret is a PEM public key.
/// Returns `Expired` only when a signature verified but the token had expired.
pub fn verify_signature(
    token: &str,
    secret: &[u8],
    leeway_secs: u64,
) -> Result<TokenData<LocalClaims>, LocalFailure> {
    let mut expired = false;

    for algorithm in ALGORITHM_PRIORITY {
        let key = match algorithm {
            Algorithm::RS256 => match DecodingKey::from_rsa_pem(secret) {
                Ok(key) => key,
                Err(_) => continue,
            },
            _ => DecodingKey::from_secret(secret),
        };

        let mut validation = Validation::new(algorithm);
        validation.leeway = leeway_secs;
        validation.validate_aud = false;

        match decode::<LocalClaims>(token, &key, &validation) {
            Ok(data) => {
                debug!("Local token verified with {:?}", algorithm);
                return Ok(data);
            }
            Err(e) if matches!(e.kind(), ErrorKind::ExpiredSignature) => expired = true,
            Err(e) => debug!("Local token rejected under {:?}: {}", algorithm, e),
        }
    }

    Err(if expired {
        LocalFailure::Expired
    } else {
        LocalFailure::Malformed
    })
}

/// Outcome of a successful local verification
#[derive(Debug, Clone)]
pub struct LocalVerification {
    pub local_id: Uuid,
    pub principal: Principal,
    pub claims: LocalClaims,
}

/// Seam for local-token verification
#[async_trait]
pub trait LocalVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<LocalVerification, AuthError>;
}

/// Verifies local tokens and resolves their owning principal.
///
/// Never provisions: a valid signature for an unknown subject is rejected.
pub struct LocalJwtVerifier {
    secret: Option<Vec<u8>>,
    leeway_secs: u64,
    principals: Arc<dyn PrincipalStore>,
}

impl LocalJwtVerifier {
    pub fn new(
        secret: Option<&str>,
        leeway: Duration,
        principals: Arc<dyn PrincipalStore>,
    ) -> Self {
        Self {
            secret: secret
                .filter(|s| !s.is_empty())
                .map(|s| s.as_bytes().to_vec()),
            leeway_secs: leeway.as_secs(),
            principals,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.secret.is_some()
    }
}

#[async_trait]
impl LocalVerifier for LocalJwtVerifier {
    #[instrument(level = "debug", skip_all)]
    async fn verify(&self, token: &str) -> Result<LocalVerification, AuthError> {
        let secret = self.secret.as_deref().ok_or(AuthError::ServiceMisconfigured)?;

        let data = verify_signature(token, secret, self.leeway_secs)?;
        let subject = data.claims.subject().ok_or(LocalFailure::Malformed)?;

        // Local principals are keyed by UUID; anything else cannot match one
        let local_id = Uuid::parse_str(&subject).map_err(|_| AuthError::UserNotFound)?;
        let principal = self
            .principals
            .find_by_id(local_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        if let Some(changed_at) = principal.password_changed_at {
            if changed_at.timestamp() > data.claims.iat {
                debug!("Local token for {} predates password change", local_id);
                return Err(LocalFailure::StaleCredentials.into());
            }
        }

        Ok(LocalVerification {
            local_id,
            principal,
            claims: data.claims,
        })
    }
}

/// Mints HS256 tokens for the password login endpoint
#[derive(Clone)]
pub struct LocalTokenIssuer {
    key: EncodingKey,
    ttl: Duration,
}

impl LocalTokenIssuer {
    /// `None` when no secret is configured
    pub fn new(secret: Option<&str>, ttl: Duration) -> Option<Self> {
        let secret = secret.filter(|s| !s.is_empty())?;
        Some(Self {
            key: EncodingKey::from_secret(secret.as_bytes()),
            ttl,
        })
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn issue(&self, principal: &Principal) -> Result<String, jsonwebtoken::errors::Error> {
        let now = Utc::now().timestamp();
        let claims = LocalClaims {
            id: Some(Value::String(principal.id.to_string())),
            sub: None,
            user_id: None,
            email: Some(principal.email.clone()),
            role: Some(principal.role.as_str().to_string()),
            iat: now,
            exp: now + self.ttl.as_secs() as i64,
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.key)
    }
}
