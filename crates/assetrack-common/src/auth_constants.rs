//! Well-known endpoints and markers for the Firebase identity provider

/// Substring present in the `iss` claim of every Firebase ID token
pub const FIREBASE_ISSUER_MARKER: &str = "securetoken.google.com";

/// Issuer prefix; the project id is appended
pub const FIREBASE_ISSUER_PREFIX: &str = "https://securetoken.google.com/";

/// Name of the provider-specific claim bag carried by Firebase ID tokens
pub const FIREBASE_CLAIM_BAG: &str = "firebase";

/// JWK set used to sign Firebase ID tokens
pub const FIREBASE_JWKS_URL: &str =
    "https://www.googleapis.com/service_accounts/v1/jwk/securetoken@system.gserviceaccount.com";

/// Identity Toolkit account lookup, used for revocation checks
pub const IDENTITY_TOOLKIT_LOOKUP_URL: &str =
    "https://identitytoolkit.googleapis.com/v1/accounts:lookup";

/// Expected issuer for a given Firebase project
pub fn firebase_issuer(project_id: &str) -> String {
    format!("{FIREBASE_ISSUER_PREFIX}{project_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issuer_contains_marker() {
        let issuer = firebase_issuer("assetrack-prod");
        assert_eq!(issuer, "https://securetoken.google.com/assetrack-prod");
        assert!(issuer.contains(FIREBASE_ISSUER_MARKER));
    }
}
