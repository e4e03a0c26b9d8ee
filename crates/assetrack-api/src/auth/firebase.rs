//! Firebase ID token verification
//!
//! [`FirebaseVerifier`] is the pipeline-facing half: it bounds the provider
//! call with a timeout and folds provider errors into [`RemoteFailure`].
//! [`FirebaseIdentityClient`] is the concrete provider. It checks the token
//! against Google's published signing keys and, when an API key is
//! configured, asks the Identity Toolkit whether the session was revoked.

use assetrack_common::auth_constants::firebase_issuer;
use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{decode, decode_header, errors::ErrorKind, Algorithm, DecodingKey, Validation};
use moka::future::Cache;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

/// Errors raised by an identity provider, discriminated at the boundary
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    #[error("id token has expired")]
    TokenExpired,
    #[error("id token has been revoked")]
    TokenRevoked,
    #[error("user account is disabled")]
    UserDisabled,
    #[error("invalid id token: {0}")]
    ArgumentError(String),
    #[error("identity provider unreachable: {0}")]
    Network(String),
    #[error("identity provider error: {0}")]
    Other(String),
}

/// Closed set of remote verification failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RemoteFailure {
    #[error("expired")]
    Expired,
    #[error("revoked")]
    Revoked,
    #[error("invalid-signature")]
    InvalidSignature,
    #[error("service-unavailable")]
    ServiceUnavailable,
}

impl From<&ProviderError> for RemoteFailure {
    fn from(err: &ProviderError) -> Self {
        match err {
            ProviderError::TokenExpired => RemoteFailure::Expired,
            ProviderError::TokenRevoked | ProviderError::UserDisabled => RemoteFailure::Revoked,
            ProviderError::ArgumentError(_) => RemoteFailure::InvalidSignature,
            ProviderError::Network(_) | ProviderError::Other(_) => {
                RemoteFailure::ServiceUnavailable
            }
        }
    }
}

/// A token the provider vouched for
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedIdToken {
    pub uid: String,
    pub email: Option<String>,
    pub name: Option<String>,
    pub claims: Value,
}

/// Remote identity provider
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn verify_id_token(
        &self,
        token: &str,
        check_revoked: bool,
    ) -> Result<DecodedIdToken, ProviderError>;
}

/// Verified remote identity handed to the provisioner
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteIdentity {
    pub external_id: String,
    pub email: String,
    pub display_name: String,
    pub claims: Value,
}

impl From<DecodedIdToken> for RemoteIdentity {
    fn from(decoded: DecodedIdToken) -> Self {
        let email = decoded
            .email
            .filter(|e| !e.is_empty())
            .unwrap_or_else(|| format!("{}@firebase.user", decoded.uid));
        let display_name = decoded
            .name
            .filter(|n| !n.is_empty())
            .or_else(|| email.split('@').next().map(str::to_string))
            .unwrap_or_else(|| decoded.uid.clone());

        Self {
            external_id: decoded.uid,
            email,
            display_name,
            claims: decoded.claims,
        }
    }
}

/// Pipeline-facing remote verifier
pub struct FirebaseVerifier {
    provider: Option<Arc<dyn IdentityProvider>>,
    timeout: Duration,
}

impl FirebaseVerifier {
    pub fn new(provider: Arc<dyn IdentityProvider>, timeout: Duration) -> Self {
        Self {
            provider: Some(provider),
            timeout,
        }
    }

    /// Verifier for deployments without a configured provider
    pub fn unavailable(timeout: Duration) -> Self {
        Self {
            provider: None,
            timeout,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.provider.is_some()
    }

    /// Verify with revocation checking. Any failure is final for the request.
    #[instrument(level = "debug", skip_all)]
    pub async fn verify(&self, token: &str) -> Result<RemoteIdentity, RemoteFailure> {
        let provider = self
            .provider
            .as_ref()
            .ok_or(RemoteFailure::ServiceUnavailable)?;

        match tokio::time::timeout(self.timeout, provider.verify_id_token(token, true)).await {
            Err(_) => {
                warn!(
                    "Remote identity verification timed out after {:?}",
                    self.timeout
                );
                Err(RemoteFailure::ServiceUnavailable)
            }
            Ok(Err(e)) => {
                let failure = RemoteFailure::from(&e);
                debug!("Remote identity verification failed: {} ({})", e, failure);
                Err(failure)
            }
            Ok(Ok(decoded)) => Ok(decoded.into()),
        }
    }
}

/// JSON Web Key Set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwkSet {
    pub keys: Vec<Jwk>,
}

/// JSON Web Key; only RSA keys are used
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Jwk {
    pub kty: String,
    pub kid: Option<String>,
    pub alg: Option<String>,
    pub n: Option<String>,
    pub e: Option<String>,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

impl Jwk {
    fn decoding_key(&self) -> Result<DecodingKey, ProviderError> {
        if self.kty != "RSA" {
            return Err(ProviderError::Other(format!(
                "unsupported key type {}",
                self.kty
            )));
        }
        let (Some(n), Some(e)) = (self.n.as_deref(), self.e.as_deref()) else {
            return Err(ProviderError::Other("RSA key missing n or e".to_string()));
        };
        DecodingKey::from_rsa_components(n, e)
            .map_err(|e| ProviderError::Other(format!("unusable RSA key: {e}")))
    }
}

/// Claims of a Firebase ID token
#[derive(Debug, Clone, Serialize, Deserialize)]
struct FirebaseClaims {
    sub: String,
    aud: String,
    iss: String,
    iat: i64,
    exp: i64,
    auth_time: i64,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(flatten)]
    other: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LookupResponse {
    #[serde(default)]
    users: Vec<LookupUser>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LookupUser {
    #[serde(default)]
    disabled: bool,
    /// Seconds since epoch, sent as a string
    #[serde(default)]
    valid_since: Option<String>,
}

/// Settings for [`FirebaseIdentityClient`]
#[derive(Debug, Clone)]
pub struct FirebaseSettings {
    pub project_id: String,
    pub api_key: Option<String>,
    pub jwks_url: String,
    pub lookup_url: String,
    pub jwks_cache_ttl: Duration,
    pub clock_skew: Duration,
    pub http_timeout: Duration,
}

/// Firebase Authentication ID token verifier
pub struct FirebaseIdentityClient {
    settings: FirebaseSettings,
    issuer: String,
    http: reqwest::Client,
    jwks: Cache<String, Arc<JwkSet>>,
}

static CLIENT: OnceCell<Arc<FirebaseIdentityClient>> = OnceCell::new();

/// Initialize the process-wide client. Later calls return the first handle
/// and ignore their settings.
pub fn init(settings: FirebaseSettings) -> Result<Arc<FirebaseIdentityClient>, ProviderError> {
    CLIENT
        .get_or_try_init(|| {
            info!(
                "Initializing Firebase identity client for project {}",
                settings.project_id
            );
            FirebaseIdentityClient::new(settings).map(Arc::new)
        })
        .cloned()
}

/// The process-wide client, if [`init`] has run
pub fn client() -> Option<Arc<FirebaseIdentityClient>> {
    CLIENT.get().cloned()
}

impl FirebaseIdentityClient {
    pub fn new(settings: FirebaseSettings) -> Result<Self, ProviderError> {
        if settings.project_id.is_empty() {
            return Err(ProviderError::Other("project id is empty".to_string()));
        }
        if settings.api_key.is_none() {
            warn!("No Firebase API key configured; revocation checks are unavailable");
        }

        let http = reqwest::Client::builder()
            .timeout(settings.http_timeout)
            .connect_timeout(settings.http_timeout)
            .user_agent(concat!("assetrack-api/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ProviderError::Other(format!("failed to build HTTP client: {e}")))?;

        let jwks = Cache::builder()
            .time_to_live(settings.jwks_cache_ttl)
            .max_capacity(4)
            .build();

        Ok(Self {
            issuer: firebase_issuer(&settings.project_id),
            settings,
            http,
            jwks,
        })
    }

    pub fn project_id(&self) -> &str {
        &self.settings.project_id
    }

    #[instrument(level = "debug", skip(self))]
    async fn fetch_jwks(&self, force: bool) -> Result<Arc<JwkSet>, ProviderError> {
        let url = &self.settings.jwks_url;
        if force {
            self.jwks.invalidate(url).await;
        } else if let Some(cached) = self.jwks.get(url).await {
            return Ok(cached);
        }

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| ProviderError::Network(format!("failed to fetch JWKS: {e}")))?;

        if !response.status().is_success() {
            return Err(ProviderError::Network(format!(
                "JWKS endpoint returned {}",
                response.status()
            )));
        }

        let jwks: JwkSet = response
            .json()
            .await
            .map_err(|e| ProviderError::Other(format!("failed to parse JWKS: {e}")))?;
        if jwks.keys.is_empty() {
            return Err(ProviderError::Other("JWKS contains no keys".to_string()));
        }

        debug!("Fetched JWKS with {} keys", jwks.keys.len());
        let jwks = Arc::new(jwks);
        self.jwks.insert(url.clone(), jwks.clone()).await;
        Ok(jwks)
    }

    /// Key for `kid`, refetching once in case the keys rotated
    async fn signing_key(&self, kid: &str) -> Result<DecodingKey, ProviderError> {
        for force in [false, true] {
            let jwks = self.fetch_jwks(force).await?;
            if let Some(jwk) = jwks.keys.iter().find(|k| k.kid.as_deref() == Some(kid)) {
                return jwk.decoding_key();
            }
        }
        Err(ProviderError::ArgumentError(format!(
            "no signing key matches kid {kid}"
        )))
    }

    fn validation(&self) -> Validation {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[&self.settings.project_id]);
        validation.set_issuer(&[&self.issuer]);
        validation.set_required_spec_claims(&["exp", "iat", "aud", "iss", "sub"]);
        validation.leeway = self.settings.clock_skew.as_secs();
        validation
    }

    #[instrument(level = "debug", skip_all)]
    async fn check_revoked(&self, token: &str, auth_time: i64) -> Result<(), ProviderError> {
        let Some(api_key) = self.settings.api_key.as_deref() else {
            debug!("Skipping revocation check; no API key configured");
            return Ok(());
        };

        let response = self
            .http
            .post(&self.settings.lookup_url)
            .query(&[("key", api_key)])
            .json(&json!({ "idToken": token }))
            .send()
            .await
            .map_err(|e| ProviderError::Network(format!("account lookup failed: {e}")))?;

        let status = response.status();
        if status.is_server_error() {
            return Err(ProviderError::Network(format!(
                "account lookup returned {status}"
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(if body.contains("USER_DISABLED") {
                ProviderError::UserDisabled
            } else if body.contains("TOKEN_EXPIRED") {
                ProviderError::TokenExpired
            } else {
                ProviderError::ArgumentError(format!("account lookup rejected token ({status})"))
            });
        }

        let lookup: LookupResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Other(format!("failed to parse account lookup: {e}")))?;
        let user = lookup
            .users
            .first()
            .ok_or_else(|| ProviderError::ArgumentError("no account for token".to_string()))?;

        if user.disabled {
            return Err(ProviderError::UserDisabled);
        }
        let valid_since = user
            .valid_since
            .as_deref()
            .and_then(|s| s.parse::<i64>().ok());
        if valid_since.is_some_and(|since| since > auth_time) {
            return Err(ProviderError::TokenRevoked);
        }
        Ok(())
    }
}

#[async_trait]
impl IdentityProvider for FirebaseIdentityClient {
    async fn verify_id_token(
        &self,
        token: &str,
        check_revoked: bool,
    ) -> Result<DecodedIdToken, ProviderError> {
        let header = decode_header(token)
            .map_err(|e| ProviderError::ArgumentError(format!("undecodable header: {e}")))?;
        if header.alg != Algorithm::RS256 {
            return Err(ProviderError::ArgumentError(format!(
                "unexpected algorithm {:?}",
                header.alg
            )));
        }
        let kid = header
            .kid
            .ok_or_else(|| ProviderError::ArgumentError("header has no kid".to_string()))?;

        let key = self.signing_key(&kid).await?;
        let claims = decode::<FirebaseClaims>(token, &key, &self.validation())
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => ProviderError::TokenExpired,
                _ => ProviderError::ArgumentError(e.to_string()),
            })?
            .claims;

        if claims.sub.is_empty() || claims.sub.len() > 128 {
            return Err(ProviderError::ArgumentError(
                "sub must be 1 to 128 characters".to_string(),
            ));
        }
        let horizon = Utc::now().timestamp() + self.settings.clock_skew.as_secs() as i64;
        if claims.auth_time > horizon || claims.iat > horizon {
            return Err(ProviderError::ArgumentError(
                "token issued in the future".to_string(),
            ));
        }

        if check_revoked {
            self.check_revoked(token, claims.auth_time).await?;
        }

        let claims_value = serde_json::to_value(&claims)
            .map_err(|e| ProviderError::Other(format!("failed to encode claims: {e}")))?;

        Ok(DecodedIdToken {
            uid: claims.sub,
            email: claims.email,
            name: claims.name,
            claims: claims_value,
        })
    }
}
