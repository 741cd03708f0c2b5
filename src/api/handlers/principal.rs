//! Authenticated principal extraction.
//!
//! Flow Overview: read the bearer header or session cookie, hash the token,
//! resolve it against the sessions table, and hand downstream handlers a
//! principal. Login handshakes happen in the external auth collaborator;
//! this service only resolves the sessions it issued.

use axum::http::{header::AUTHORIZATION, HeaderMap, StatusCode};
use sqlx::PgPool;
use tracing::error;
use uuid::Uuid;

use crate::identity::sessions::{hash_session_token, SessionRepo};

pub(crate) const SESSION_COOKIE_NAME: &str = "kerno_session";

/// Authenticated user context derived from a presented session token.
#[derive(Clone, Debug)]
pub struct Principal {
    pub user_id: Uuid,
    pub email: String,
    /// Session backing this request; kept so "revoke all others" can spare it.
    pub session_id: Uuid,
}

/// Resolve the request's session token into a principal, or 401.
///
/// # Errors
/// `UNAUTHORIZED` for missing/unknown/expired tokens, `INTERNAL_SERVER_ERROR`
/// when the lookup itself fails.
pub async fn require_auth(headers: &HeaderMap, pool: &PgPool) -> Result<Principal, StatusCode> {
    let Some(token) = extract_session_token(headers) else {
        return Err(StatusCode::UNAUTHORIZED);
    };
    // Only the hash is stored; never compare raw tokens against the database.
    let token_hash = hash_session_token(&token);
    match SessionRepo::lookup(pool, &token_hash).await {
        Ok(Some(record)) => Ok(Principal {
            user_id: record.user_id,
            email: record.email,
            session_id: record.session_id,
        }),
        Ok(None) => Err(StatusCode::UNAUTHORIZED),
        Err(err) => {
            error!("Failed to lookup session: {err}");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Extract a client IP for audit entries from common proxy headers.
pub(crate) fn extract_client_ip(headers: &HeaderMap) -> Option<String> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());
    if let Some(ip) = forwarded {
        return Some(ip.to_string());
    }
    headers
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToString::to_string)
}

pub(crate) fn extract_user_agent(headers: &HeaderMap) -> Option<String> {
    headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .map(ToString::to_string)
}

fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    if let Some(token) = extract_bearer_token(headers) {
        return Some(token);
    }
    let header = headers.get(axum::http::header::COOKIE)?;
    let value = header.to_str().ok()?;
    for pair in value.split(';') {
        let trimmed = pair.trim();
        let mut parts = trimmed.splitn(2, '=');
        let key = parts.next()?.trim();
        let val = parts.next()?.trim();
        if key == SESSION_COOKIE_NAME && !val.is_empty() {
            return Some(val.to_string());
        }
    }
    None
}

fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let header = headers.get(AUTHORIZATION)?;
    let value = header.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn bearer_token_wins_over_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc123"));
        headers.insert(
            axum::http::header::COOKIE,
            HeaderValue::from_static("kerno_session=cookie-token"),
        );
        assert_eq!(extract_session_token(&headers).as_deref(), Some("abc123"));
    }

    #[test]
    fn cookie_token_is_parsed_from_pairs() {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::COOKIE,
            HeaderValue::from_static("theme=dark; kerno_session=cookie-token; lang=eo"),
        );
        assert_eq!(
            extract_session_token(&headers).as_deref(),
            Some("cookie-token")
        );
    }

    #[test]
    fn missing_or_empty_tokens_are_none() {
        let headers = HeaderMap::new();
        assert_eq!(extract_session_token(&headers), None);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer "));
        headers.insert(
            axum::http::header::COOKIE,
            HeaderValue::from_static("kerno_session="),
        );
        assert_eq!(extract_session_token(&headers), None);
    }

    #[test]
    fn client_ip_prefers_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("1.2.3.4, 5.6.7.8"),
        );
        headers.insert("x-real-ip", HeaderValue::from_static("9.9.9.9"));
        assert_eq!(extract_client_ip(&headers).as_deref(), Some("1.2.3.4"));

        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("9.9.9.9"));
        assert_eq!(extract_client_ip(&headers).as_deref(), Some("9.9.9.9"));

        assert_eq!(extract_client_ip(&HeaderMap::new()), None);
    }
}
