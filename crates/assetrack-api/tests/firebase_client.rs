//! Firebase ID token verification against a mock key and account service

use assetrack_api::auth::{
    firebase::{self, FirebaseIdentityClient, FirebaseSettings},
    IdentityProvider, ProviderError,
};
use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::time::Duration;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PROJECT: &str = "assetrack-test";
const KID: &str = "test-key-1";
const PRIVATE_KEY: &[u8] = include_bytes!("fixtures/firebase_test_key.pem");
const MODULUS: &str = "rZ4Tdl5H8cpiSBhPbhzD9MPSx1VCtUUNzyt_j_xAMshpuoCDQ0IBr9QlOkqZwIUpSO4yXEHaBj-I8b4HLT_buWbQDsX6Rr1Dea-Uh6SWDUNtNAE2UZTpm4mT5mYizchRTnR_OMMB9yVpncrXnwlRIIjmWyoBodYQ52eAafGoOVjmgOBREl-cNbicB4VnQETlHAgEUWuU-teGNI6NgRAw4bTxJP3za2aLJYXv-7Daxo65msGa6HHgDHZm7WMxi2FB7SQU4koK_qDPlxsuEm6uPYwp-3ETEPfW5xrhQ6CYXU0OJwDBqR9E8meoLmHVlJT3PXSAkbaQ_kgzPtLTWCSK9Q";

fn jwks(kid: &str) -> Value {
    json!({
        "keys": [{
            "kty": "RSA",
            "kid": kid,
            "alg": "RS256",
            "use": "sig",
            "n": MODULUS,
            "e": "AQAB"
        }]
    })
}

fn settings(server: &MockServer, api_key: Option<&str>) -> FirebaseSettings {
    FirebaseSettings {
        project_id: PROJECT.to_string(),
        api_key: api_key.map(str::to_string),
        jwks_url: format!("{}/jwks", server.uri()),
        lookup_url: format!("{}/accounts:lookup", server.uri()),
        jwks_cache_ttl: Duration::from_secs(300),
        clock_skew: Duration::from_secs(5),
        http_timeout: Duration::from_secs(2),
    }
}

fn claims(uid: &str) -> Value {
    let now = Utc::now().timestamp();
    json!({
        "iss": format!("https://securetoken.google.com/{PROJECT}"),
        "aud": PROJECT,
        "auth_time": now - 30,
        "iat": now - 30,
        "exp": now + 3600,
        "sub": uid,
        "email": "ada@example.com",
        "name": "Ada Lovelace",
        "firebase": { "sign_in_provider": "password" }
    })
}

fn sign(claims: &Value, kid: &str) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(kid.to_string());
    encode(
        &header,
        claims,
        &EncodingKey::from_rsa_pem(PRIVATE_KEY).unwrap(),
    )
    .unwrap()
}

async fn server_with_keys() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/jwks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(jwks(KID)))
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn test_valid_token_is_decoded() {
    let server = server_with_keys().await;
    let client = FirebaseIdentityClient::new(settings(&server, None)).unwrap();

    let decoded = client
        .verify_id_token(&sign(&claims("uid-ada"), KID), false)
        .await
        .unwrap();

    assert_eq!(decoded.uid, "uid-ada");
    assert_eq!(decoded.email.as_deref(), Some("ada@example.com"));
    assert_eq!(decoded.name.as_deref(), Some("Ada Lovelace"));
    assert_eq!(decoded.claims["firebase"]["sign_in_provider"], "password");
}

#[tokio::test]
async fn test_jwks_is_cached() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/jwks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(jwks(KID)))
        .expect(1)
        .mount(&server)
        .await;
    let client = FirebaseIdentityClient::new(settings(&server, None)).unwrap();

    for uid in ["uid-1", "uid-2", "uid-3"] {
        client
            .verify_id_token(&sign(&claims(uid), KID), false)
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn test_expired_token() {
    let server = server_with_keys().await;
    let client = FirebaseIdentityClient::new(settings(&server, None)).unwrap();

    let mut expired = claims("uid-ada");
    let now = Utc::now().timestamp();
    expired["iat"] = json!(now - 7200);
    expired["auth_time"] = json!(now - 7200);
    expired["exp"] = json!(now - 3600);

    let err = client
        .verify_id_token(&sign(&expired, KID), false)
        .await
        .unwrap_err();
    assert_eq!(err, ProviderError::TokenExpired);
}

#[tokio::test]
async fn test_wrong_audience_rejected() {
    let server = server_with_keys().await;
    let client = FirebaseIdentityClient::new(settings(&server, None)).unwrap();

    let mut foreign = claims("uid-ada");
    foreign["aud"] = json!("some-other-project");

    let err = client
        .verify_id_token(&sign(&foreign, KID), false)
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::ArgumentError(_)), "{err:?}");
}

#[tokio::test]
async fn test_future_auth_time_rejected() {
    let server = server_with_keys().await;
    let client = FirebaseIdentityClient::new(settings(&server, None)).unwrap();

    let mut early = claims("uid-ada");
    early["auth_time"] = json!(Utc::now().timestamp() + 600);

    let err = client
        .verify_id_token(&sign(&early, KID), false)
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::ArgumentError(_)));
}

#[tokio::test]
async fn test_unknown_kid_refetches_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/jwks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(jwks(KID)))
        .expect(2)
        .mount(&server)
        .await;
    let client = FirebaseIdentityClient::new(settings(&server, None)).unwrap();

    let err = client
        .verify_id_token(&sign(&claims("uid-ada"), "rotated-away"), false)
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::ArgumentError(_)));
}

#[tokio::test]
async fn test_jwks_outage_is_network_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/jwks"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    let client = FirebaseIdentityClient::new(settings(&server, None)).unwrap();

    let err = client
        .verify_id_token(&sign(&claims("uid-ada"), KID), false)
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::Network(_)), "{err:?}");
}

#[tokio::test]
async fn test_revoked_session() {
    let server = server_with_keys().await;
    let valid_since = Utc::now().timestamp().to_string();
    Mock::given(method("POST"))
        .and(path("/accounts:lookup"))
        .and(query_param("key", "web-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "users": [{ "localId": "uid-ada", "disabled": false, "validSince": valid_since }]
        })))
        .mount(&server)
        .await;
    let client = FirebaseIdentityClient::new(settings(&server, Some("web-key"))).unwrap();

    let err = client
        .verify_id_token(&sign(&claims("uid-ada"), KID), true)
        .await
        .unwrap_err();
    assert_eq!(err, ProviderError::TokenRevoked);
}

#[tokio::test]
async fn test_disabled_account() {
    let server = server_with_keys().await;
    Mock::given(method("POST"))
        .and(path("/accounts:lookup"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "users": [{ "localId": "uid-ada", "disabled": true }]
        })))
        .mount(&server)
        .await;
    let client = FirebaseIdentityClient::new(settings(&server, Some("web-key"))).unwrap();

    let err = client
        .verify_id_token(&sign(&claims("uid-ada"), KID), true)
        .await
        .unwrap_err();
    assert_eq!(err, ProviderError::UserDisabled);
}

#[tokio::test]
async fn test_revocation_check_passes_for_live_session() {
    let server = server_with_keys().await;
    let valid_since = (Utc::now().timestamp() - 86_400).to_string();
    Mock::given(method("POST"))
        .and(path("/accounts:lookup"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "users": [{ "localId": "uid-ada", "validSince": valid_since }]
        })))
        .expect(1)
        .mount(&server)
        .await;
    let client = FirebaseIdentityClient::new(settings(&server, Some("web-key"))).unwrap();

    let decoded = client
        .verify_id_token(&sign(&claims("uid-ada"), KID), true)
        .await
        .unwrap();
    assert_eq!(decoded.uid, "uid-ada");
}

#[tokio::test]
async fn test_init_is_idempotent() {
    let server = server_with_keys().await;
    let first = firebase::init(settings(&server, None)).unwrap();

    let mut other = settings(&server, None);
    other.project_id = "another-project".to_string();
    let second = firebase::init(other).unwrap();

    assert!(std::sync::Arc::ptr_eq(&first, &second));
    assert_eq!(second.project_id(), PROJECT);
    assert!(firebase::client().is_some());
}
