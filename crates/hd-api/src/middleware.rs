//! # Request pipeline
//!
//! Order on `/api`: rate limit, request validation, then per-group
//! authentication and role checks. Each stage short-circuits with the
//! JSON envelope.

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Query, Request, State};
use axum::http::{header, HeaderMap, Method};
use axum::middleware::Next;
use axum::response::Response;
use hd_core::models::Role;

use crate::error::ApiError;
use crate::extract::AuthUser;
use crate::state::AppState;

/// Proxy headers consulted for the client address, most trusted first.
/// `X-Forwarded-For` is handled separately because it holds a list.
const REAL_IP: &str = "x-real-ip";
const FORWARDED_FOR: &str = "x-forwarded-for";
const CDN_HEADERS: [&str; 2] = ["cf-connecting-ip", "true-client-ip"];

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Resolves the caller's IP from proxy headers, falling back to the socket address.
pub fn client_ip(headers: &HeaderMap, connect: Option<&ConnectInfo<SocketAddr>>) -> String {
    if let Some(ip) = header_str(headers, REAL_IP) {
        return ip.to_string();
    }
    if let Some(list) = header_str(headers, FORWARDED_FOR) {
        if let Some(first) = list.split(',').map(str::trim).find(|s| !s.is_empty()) {
            return first.to_string();
        }
    }
    for name in CDN_HEADERS {
        if let Some(ip) = header_str(headers, name) {
            return ip.to_string();
        }
    }
    connect
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

pub async fn rate_limit(State(state): State<AppState>, req: Request, next: Next) -> Result<Response, ApiError> {
    let Some(limiter) = state.rate_limiter.as_deref() else {
        return Ok(next.run(req).await);
    };

    let ip = client_ip(req.headers(), req.extensions().get::<ConnectInfo<SocketAddr>>());
    match limiter.check(&ip) {
        Ok(()) => Ok(next.run(req).await),
        Err(err) => {
            tracing::warn!(%ip, method = %req.method(), path = %req.uri().path(), "request rate limited");
            Err(err.into())
        }
    }
}

fn carries_body(method: &Method) -> bool {
    matches!(*method, Method::POST | Method::PUT | Method::PATCH)
}

/// Body-carrying requests must declare JSON; query parameters may not be blank.
pub async fn validate_request(req: Request, next: Next) -> Result<Response, ApiError> {
    let mut problems = Vec::new();

    if carries_body(req.method()) {
        let is_json = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(';').next())
            .is_some_and(|mime| mime.trim().eq_ignore_ascii_case("application/json"));
        if !is_json {
            problems.push(("Content-Type".to_string(), "Content-Type must be application/json".to_string()));
        }
    }

    let Query(pairs) = Query::<Vec<(String, String)>>::try_from_uri(req.uri())?;
    for (key, value) in pairs {
        if value.trim().is_empty() {
            problems.push((key, "Query parameter cannot be empty".to_string()));
        }
    }

    if !problems.is_empty() {
        tracing::warn!(path = %req.uri().path(), count = problems.len(), "request failed validation");
        return Err(ApiError::validation(problems));
    }
    Ok(next.run(req).await)
}

/// Resolves the bearer token into an [`hd_core::models::Identity`] request extension.
pub async fn require_auth(State(state): State<AppState>, mut req: Request, next: Next) -> Result<Response, ApiError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::unauthorized("missing Authorization header"))?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::unauthorized("expected 'Bearer <token>'"))?;

    let identity = state.tokens.verify_token(token).map_err(|e| {
        tracing::warn!(error = %e, "token rejected");
        ApiError::from(e)
    })?;

    tracing::debug!(user_id = identity.user_id, role = %identity.role, "request authenticated");
    req.extensions_mut().insert(identity);
    Ok(next.run(req).await)
}

/// Roles admitted by [`require_roles`]. Master is always admitted.
#[derive(Debug, Clone, Copy)]
pub struct RequiredRoles(pub &'static [Role]);

pub async fn require_roles(
    State(RequiredRoles(allowed)): State<RequiredRoles>,
    AuthUser(identity): AuthUser,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if !identity.has_any_role(allowed) {
        tracing::warn!(user_id = identity.user_id, role = %identity.role, path = %req.uri().path(), "role not permitted");
        return Err(ApiError::forbidden(format!("role '{}' may not access this resource", identity.role)));
    }
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn real_ip_header_wins() {
        let h = headers(&[("x-real-ip", "1.1.1.1"), ("x-forwarded-for", "2.2.2.2"), ("cf-connecting-ip", "3.3.3.3")]);
        assert_eq!(client_ip(&h, None), "1.1.1.1");
    }

    #[test]
    fn first_forwarded_entry_is_used() {
        let h = headers(&[("x-forwarded-for", " 2.2.2.2 , 10.0.0.1"), ("true-client-ip", "4.4.4.4")]);
        assert_eq!(client_ip(&h, None), "2.2.2.2");
    }

    #[test]
    fn cdn_headers_in_order() {
        let h = headers(&[("true-client-ip", "4.4.4.4"), ("cf-connecting-ip", "3.3.3.3")]);
        assert_eq!(client_ip(&h, None), "3.3.3.3");

        let h = headers(&[("true-client-ip", "4.4.4.4")]);
        assert_eq!(client_ip(&h, None), "4.4.4.4");
    }

    #[test]
    fn falls_back_to_socket_then_unknown() {
        let addr: SocketAddr = "192.0.2.10:51000".parse().unwrap();
        assert_eq!(client_ip(&HeaderMap::new(), Some(&ConnectInfo(addr))), "192.0.2.10");
        assert_eq!(client_ip(&HeaderMap::new(), None), "unknown");
    }
}
