//! Per-request authentication context

use async_trait::async_trait;
use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::{header, request::Parts, HeaderMap, Extensions},
};
use serde::Serialize;
use std::convert::Infallible;
use std::fmt;
use std::net::SocketAddr;

use super::error::{AuthError, AuthRejection};
use crate::models::{Principal, RequestMeta};

/// Trust scheme a request was authenticated under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuthScheme {
    Demo,
    RemoteIdentity,
    LocalJwt,
}

impl AuthScheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthScheme::Demo => "demo",
            AuthScheme::RemoteIdentity => "remote-identity",
            AuthScheme::LocalJwt => "local-jwt",
        }
    }
}

impl fmt::Display for AuthScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Attached to request extensions once authentication succeeds; owned by
/// the request and dropped with it.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub principal: Principal,
    pub scheme: AuthScheme,
    pub raw_token: String,
    pub meta: RequestMeta,
}

#[async_trait]
impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<RequestContext>()
            .cloned()
            .ok_or_else(|| AuthError::Unauthenticated.with_details(false))
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for RequestMeta
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(request_meta(&parts.headers, &parts.extensions))
    }
}

/// Bearer credentials from the `Authorization` header. `None` when the
/// header is absent, not `Bearer`, or empty.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Source address and user agent; the first forwarded hop wins over the
/// socket peer.
pub fn request_meta(headers: &HeaderMap, extensions: &Extensions) -> RequestMeta {
    let header_str = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };

    let source = header_str("x-forwarded-for")
        .and_then(|v| v.split(',').next().map(|hop| hop.trim().to_string()))
        .or_else(|| header_str("x-real-ip"))
        .or_else(|| {
            extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        });

    RequestMeta::new(source, header_str(header::USER_AGENT.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_bearer_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc.def.ghi"));
        assert_eq!(bearer_token(&headers), Some("abc.def.ghi"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("bearer   tok "));
        assert_eq!(bearer_token(&headers), Some("tok"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic dXNlcjpwYXNz"));
        assert_eq!(bearer_token(&headers), None);
    }

    #[test]
    fn test_meta_prefers_forwarded_hop() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7, 10.0.0.1"));
        headers.insert(header::USER_AGENT, HeaderValue::from_static("curl/8.4"));

        let mut extensions = Extensions::new();
        extensions.insert(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 9000))));

        let meta = request_meta(&headers, &extensions);
        assert_eq!(meta.source_address, "203.0.113.7");
        assert_eq!(meta.user_agent, "curl/8.4");
    }

    #[test]
    fn test_meta_defaults_to_unknown() {
        let meta = request_meta(&HeaderMap::new(), &Extensions::new());
        assert_eq!(meta, RequestMeta::unknown());
    }

    #[test]
    fn test_scheme_tags() {
        assert_eq!(AuthScheme::RemoteIdentity.to_string(), "remote-identity");
        assert_eq!(
            serde_json::to_value(AuthScheme::LocalJwt).unwrap(),
            "local-jwt"
        );
    }
}
