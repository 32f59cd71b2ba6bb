//! Request-id tagging, per-client rate limiting, and API-key auth.

use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderMap, HeaderName, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use uuid::Uuid;

use super::server::AppState;
use crate::error::Error;
use crate::limiter::Admission;

/// Response header: correlation ID (UUID v4).
pub const REQUEST_ID_HEADER: &str = "x-request-id";
pub const RATE_LIMIT_LIMIT_HEADER: &str = "x-ratelimit-limit";
pub const RATE_LIMIT_REMAINING_HEADER: &str = "x-ratelimit-remaining";
/// Seconds until the client's window rolls over.
pub const RATE_LIMIT_RESET_HEADER: &str = "x-ratelimit-reset";

/// Correlation ID attached to every request as an extension.
#[derive(Debug, Clone, Copy)]
pub struct RequestId(pub Uuid);

pub async fn request_id(mut request: Request, next: Next) -> Response {
    let id = RequestId(Uuid::new_v4());
    request.extensions_mut().insert(id);

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&id.0.to_string()) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
    }
    response
}

/// Derive the rate-limit identity for a request.
///
/// Prefers the first `X-Forwarded-For` hop, then `X-Real-IP`, then the peer
/// address. Requests with none of these share the `"unknown"` bucket.
pub fn client_identity(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    let real_ip = headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    forwarded
        .or(real_ip)
        .map(str::to_string)
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

/// Admit or reject every request before it reaches a route.
pub async fn rate_limit(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let identity = client_identity(request.headers(), peer);

    match state.limiter.check(&identity) {
        Ok(admission) => {
            let mut response = next.run(request).await;
            attach_rate_limit_headers(&mut response, &admission);
            response
        }
        Err(exceeded) => {
            tracing::warn!(
                identity = %identity,
                limit = exceeded.limit,
                retry_after_secs = exceeded.retry_after.as_secs(),
                "Rate limit exceeded"
            );
            Error::RateLimited(exceeded).into_response()
        }
    }
}

fn attach_rate_limit_headers(response: &mut Response, admission: &Admission) {
    let headers = response.headers_mut();
    headers.insert(
        HeaderName::from_static(RATE_LIMIT_LIMIT_HEADER),
        HeaderValue::from(admission.limit),
    );
    headers.insert(
        HeaderName::from_static(RATE_LIMIT_REMAINING_HEADER),
        HeaderValue::from(admission.remaining),
    );
    headers.insert(
        HeaderName::from_static(RATE_LIMIT_RESET_HEADER),
        HeaderValue::from(admission.reset_after.as_secs()),
    );
}

/// Require `Authorization: Bearer <secret>` matching a configured secret.
///
/// With no secrets configured every request passes.
pub async fn require_api_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, Error> {
    let auth = &state.config.auth;
    if auth.api_secrets.is_empty() {
        return Ok(next.run(request).await);
    }

    let authorized = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.strip_prefix("Bearer ").unwrap_or(v).trim())
        .is_some_and(|key| auth.accepts(key));

    if !authorized {
        tracing::debug!(path = %request.uri().path(), "Rejected request with invalid API key");
        return Err(Error::Unauthorized);
    }
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_prefers_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "203.0.113.7, 10.0.0.1".parse().unwrap());
        headers.insert("x-real-ip", "198.51.100.2".parse().unwrap());
        let peer: SocketAddr = "127.0.0.1:5000".parse().unwrap();

        assert_eq!(client_identity(&headers, Some(peer)), "203.0.113.7");
    }

    #[test]
    fn test_identity_falls_back_to_real_ip_then_peer() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", "198.51.100.2".parse().unwrap());
        assert_eq!(client_identity(&headers, None), "198.51.100.2");

        let peer: SocketAddr = "192.0.2.9:5000".parse().unwrap();
        assert_eq!(client_identity(&HeaderMap::new(), Some(peer)), "192.0.2.9");
        assert_eq!(client_identity(&HeaderMap::new(), None), "unknown");
    }
}
