//! Authentication configuration

use assetrack_common::auth_constants::{
    FIREBASE_CLAIM_BAG, FIREBASE_ISSUER_MARKER, FIREBASE_JWKS_URL, IDENTITY_TOOLKIT_LOOKUP_URL,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::auth::{ClassifierSettings, FirebaseSettings};

/// Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Enables demo sentinel tokens and detailed error bodies
    pub development_mode: bool,

    /// Shared secret for locally issued tokens; local tokens are refused
    /// with a 503 while unset
    pub local_jwt_secret: Option<String>,

    /// Lifetime of tokens minted by the login endpoint, in seconds
    pub local_token_ttl: u64,

    /// Allowed clock skew for token time claims, in seconds
    pub clock_skew: u64,

    /// Firebase Authentication
    pub firebase: FirebaseConfig,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            development_mode: false,
            local_jwt_secret: None,
            local_token_ttl: 86_400,
            clock_skew: 60,
            firebase: FirebaseConfig::default(),
        }
    }
}

impl AuthConfig {
    pub fn local_token_ttl(&self) -> Duration {
        Duration::from_secs(self.local_token_ttl)
    }

    pub fn clock_skew(&self) -> Duration {
        Duration::from_secs(self.clock_skew)
    }

    pub fn classifier_settings(&self) -> ClassifierSettings {
        ClassifierSettings {
            development_mode: self.development_mode,
            issuer_marker: self.firebase.issuer_marker.clone(),
            claim_bag: self.firebase.claim_bag.clone(),
        }
    }
}

/// Firebase Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FirebaseConfig {
    /// Firebase project id; remote identity tokens are refused while unset
    pub project_id: Option<String>,

    /// Web API key, required for revocation checks
    pub api_key: Option<String>,

    pub jwks_url: String,
    pub lookup_url: String,

    /// Substring of `iss` that marks a token as Firebase-issued
    pub issuer_marker: String,

    /// Provider-specific claim object required on Firebase tokens
    pub claim_bag: String,

    /// Upper bound on one verification, in seconds
    pub verify_timeout: u64,

    /// JWKS cache lifetime, in seconds
    pub jwks_cache_ttl: u64,

    /// Timeout for individual HTTP calls to Google, in seconds
    pub http_timeout: u64,
}

impl Default for FirebaseConfig {
    fn default() -> Self {
        Self {
            project_id: None,
            api_key: None,
            jwks_url: FIREBASE_JWKS_URL.to_string(),
            lookup_url: IDENTITY_TOOLKIT_LOOKUP_URL.to_string(),
            issuer_marker: FIREBASE_ISSUER_MARKER.to_string(),
            claim_bag: FIREBASE_CLAIM_BAG.to_string(),
            verify_timeout: 5,
            jwks_cache_ttl: 3600,
            http_timeout: 10,
        }
    }
}

impl FirebaseConfig {
    pub fn verify_timeout(&self) -> Duration {
        Duration::from_secs(self.verify_timeout)
    }

    /// Client settings, or `None` when no project is configured
    pub fn settings(&self, clock_skew: Duration) -> Option<FirebaseSettings> {
        let project_id = self.project_id.clone().filter(|p| !p.is_empty())?;
        Some(FirebaseSettings {
            project_id,
            api_key: self.api_key.clone().filter(|k| !k.is_empty()),
            jwks_url: self.jwks_url.clone(),
            lookup_url: self.lookup_url.clone(),
            jwks_cache_ttl: Duration::from_secs(self.jwks_cache_ttl),
            clock_skew,
            http_timeout: Duration::from_secs(self.http_timeout),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_firebase_disabled_without_project() {
        let config = FirebaseConfig::default();
        assert!(config.settings(Duration::from_secs(60)).is_none());

        let config = FirebaseConfig {
            project_id: Some("assetrack-test".into()),
            api_key: Some(String::new()),
            ..Default::default()
        };
        let settings = config.settings(Duration::from_secs(60)).unwrap();
        assert_eq!(settings.project_id, "assetrack-test");
        assert!(settings.api_key.is_none());
    }

    #[test]
    fn test_classifier_settings_follow_config() {
        let config = AuthConfig {
            development_mode: true,
            ..Default::default()
        };
        let settings = config.classifier_settings();
        assert!(settings.development_mode);
        assert_eq!(settings.issuer_marker, "securetoken.google.com");
        assert_eq!(settings.claim_bag, "firebase");
    }
}
