//! Structural bearer-token classification
//!
//! Decides which trust scheme a bearer string *claims* to belong to. Nothing
//! here verifies a signature, and nothing here performs I/O: the decoded
//! header and claims are untrusted until a verifier has confirmed them.

use base64::{
    alphabet,
    engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
    Engine as _,
};
use serde_json::{Map, Value};

use super::demo::{self, DemoToken};

/// JWT segments are base64url; accept them with or without padding.
const SEGMENT_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Algorithms a locally issued token may declare
pub const LOCAL_ALGORITHMS: [&str; 3] = ["HS256", "HS512", "RS256"];

/// Claims that can carry the local subject, in lookup order
pub const SUBJECT_CLAIMS: [&str; 3] = ["id", "sub", "userId"];

/// Candidate trust scheme for a bearer string
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenClass {
    Demo(DemoToken),
    RemoteIdentity,
    LocalJwt,
    Unknown,
}

/// Inputs the classifier needs from configuration
#[derive(Debug, Clone)]
pub struct ClassifierSettings {
    pub development_mode: bool,
    /// Substring that marks the remote provider in `iss`
    pub issuer_marker: String,
    /// Name of the provider-specific claim object
    pub claim_bag: String,
}

/// A classified bearer token. Header and claims are decoded but unverified.
#[derive(Debug, Clone)]
pub struct TokenEnvelope<'a> {
    pub raw: &'a str,
    pub class: TokenClass,
    pub header: Option<Map<String, Value>>,
    pub claims: Option<Map<String, Value>>,
}

impl<'a> TokenEnvelope<'a> {
    fn unknown(raw: &'a str) -> Self {
        Self {
            raw,
            class: TokenClass::Unknown,
            header: None,
            claims: None,
        }
    }

    pub fn algorithm(&self) -> Option<&str> {
        self.header.as_ref()?.get("alg")?.as_str()
    }
}

/// Classify a bearer string. Never fails; `Unknown` is the rejection signal.
pub fn classify<'a>(token: &'a str, settings: &ClassifierSettings) -> TokenEnvelope<'a> {
    if let Some(demo) = demo::recognize(token, settings.development_mode) {
        return TokenEnvelope {
            raw: token,
            class: TokenClass::Demo(demo),
            header: None,
            claims: None,
        };
    }

    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != 3 {
        return TokenEnvelope::unknown(token);
    }

    let (Some(header), Some(claims)) = (decode_segment(segments[0]), decode_segment(segments[1]))
    else {
        return TokenEnvelope::unknown(token);
    };

    let class = if is_remote_identity(&header, &claims, settings) {
        TokenClass::RemoteIdentity
    } else if is_local_jwt(&header, &claims) {
        TokenClass::LocalJwt
    } else {
        TokenClass::Unknown
    };

    TokenEnvelope {
        raw: token,
        class,
        header: Some(header),
        claims: Some(claims),
    }
}

/// base64url then JSON; only objects count as a decoded segment
fn decode_segment(segment: &str) -> Option<Map<String, Value>> {
    let bytes = SEGMENT_ENGINE.decode(segment).ok()?;
    match serde_json::from_slice::<Value>(&bytes).ok()? {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

fn has_claim(claims: &Map<String, Value>, name: &str) -> bool {
    claims.get(name).is_some_and(|v| !v.is_null())
}

fn is_remote_identity(
    header: &Map<String, Value>,
    claims: &Map<String, Value>,
    settings: &ClassifierSettings,
) -> bool {
    let rs256 = header.get("alg").and_then(Value::as_str) == Some("RS256");
    let issuer = claims
        .get("iss")
        .and_then(Value::as_str)
        .is_some_and(|iss| iss.contains(&settings.issuer_marker));
    let claim_bag = claims
        .get(&settings.claim_bag)
        .is_some_and(Value::is_object);

    rs256
        && issuer
        && claim_bag
        && has_claim(claims, "aud")
        && has_claim(claims, "auth_time")
        && has_claim(claims, "exp")
        && has_claim(claims, "iat")
}

fn is_local_jwt(header: &Map<String, Value>, claims: &Map<String, Value>) -> bool {
    let alg_ok = header
        .get("alg")
        .and_then(Value::as_str)
        .is_some_and(|alg| LOCAL_ALGORITHMS.contains(&alg));

    alg_ok
        && SUBJECT_CLAIMS.iter().any(|c| has_claim(claims, c))
        && has_claim(claims, "iat")
        && has_claim(claims, "exp")
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;

    pub(crate) fn settings(development_mode: bool) -> ClassifierSettings {
        ClassifierSettings {
            development_mode,
            issuer_marker: "securetoken.google.com".to_string(),
            claim_bag: "firebase".to_string(),
        }
    }

    /// Unsigned token with the given header and payload; the signature
    /// segment is opaque to the classifier.
    pub(crate) fn shaped_token(header: Value, payload: Value) -> String {
        format!(
            "{}.{}.c2lnbmF0dXJl",
            SEGMENT_ENGINE.encode(header.to_string()),
            SEGMENT_ENGINE.encode(payload.to_string())
        )
    }

    pub(crate) fn firebase_payload() -> Value {
        json!({
            "iss": "https://securetoken.google.com/assetrack-test",
            "aud": "assetrack-test",
            "auth_time": 1_700_000_000,
            "iat": 1_700_000_000,
            "exp": 1_700_003_600,
            "sub": "firebase-uid-1",
            "user_id": "firebase-uid-1",
            "email": "ada@example.com",
            "firebase": {"sign_in_provider": "password", "identities": {}}
        })
    }

    #[test]
    fn test_wrong_segment_count_is_unknown() {
        for token in ["", "abc", "a.b", "a.b.c.d", "...."] {
            assert_eq!(classify(token, &settings(true)).class, TokenClass::Unknown);
        }
    }

    #[test]
    fn test_bad_base64_or_json_is_unknown() {
        let s = settings(false);
        assert_eq!(classify("!!!.###.sig", &s).class, TokenClass::Unknown);

        let not_json = format!(
            "{}.{}.sig",
            SEGMENT_ENGINE.encode("not json"),
            SEGMENT_ENGINE.encode("{}")
        );
        assert_eq!(classify(&not_json, &s).class, TokenClass::Unknown);

        let array_payload = shaped_token(json!({"alg": "HS256"}), json!([1, 2, 3]));
        assert_eq!(classify(&array_payload, &s).class, TokenClass::Unknown);
    }

    #[test]
    fn test_firebase_shape_is_remote_identity() {
        let token = shaped_token(json!({"alg": "RS256", "kid": "k1"}), firebase_payload());
        let envelope = classify(&token, &settings(false));
        assert_eq!(envelope.class, TokenClass::RemoteIdentity);
        assert_eq!(envelope.algorithm(), Some("RS256"));
    }

    #[test]
    fn test_remote_identity_requires_every_marker() {
        let s = settings(false);
        for missing in ["aud", "auth_time", "exp", "iat", "firebase"] {
            let mut payload = firebase_payload();
            payload.as_object_mut().unwrap().remove(missing);
            let token = shaped_token(json!({"alg": "RS256"}), payload);
            assert_ne!(
                classify(&token, &s).class,
                TokenClass::RemoteIdentity,
                "still remote without {missing}"
            );
        }

        let hs = shaped_token(json!({"alg": "HS256"}), firebase_payload());
        assert_eq!(classify(&hs, &s).class, TokenClass::LocalJwt);
    }

    #[test]
    fn test_local_shape() {
        let s = settings(false);
        for subject in SUBJECT_CLAIMS {
            let token = shaped_token(
                json!({"alg": "HS512", "typ": "JWT"}),
                json!({subject: "42", "iat": 1, "exp": 2}),
            );
            assert_eq!(classify(&token, &s).class, TokenClass::LocalJwt);
        }

        let no_exp = shaped_token(json!({"alg": "HS256"}), json!({"id": "42", "iat": 1}));
        assert_eq!(classify(&no_exp, &s).class, TokenClass::Unknown);

        let none_alg = shaped_token(json!({"alg": "none"}), json!({"id": "1", "iat": 1, "exp": 2}));
        assert_eq!(classify(&none_alg, &s).class, TokenClass::Unknown);
    }

    #[test]
    fn test_padded_segments_are_accepted() {
        let padded = base64::engine::general_purpose::URL_SAFE;
        let token = format!(
            "{}.{}.sig",
            padded.encode(json!({"alg": "HS256"}).to_string()),
            padded.encode(json!({"sub": "7", "iat": 1, "exp": 2}).to_string())
        );
        assert_eq!(classify(&token, &settings(false)).class, TokenClass::LocalJwt);
    }

    #[cfg(feature = "demo-tokens")]
    #[test]
    fn test_demo_sentinels_only_in_development_mode() {
        assert_eq!(
            classify("demo-admin-token", &settings(true)).class,
            TokenClass::Demo(DemoToken::Admin)
        );
        assert_eq!(
            classify("demo-user-token", &settings(true)).class,
            TokenClass::Demo(DemoToken::User)
        );
        assert_eq!(
            classify("demo-admin-token", &settings(false)).class,
            TokenClass::Unknown
        );
    }
}
