//! Session cookie codec
//!
//! The provider-issued access token is carried verbatim in a single cookie
//! scoped to the parent domain, so every protected subdomain presents it to
//! the forward-auth check.

use axum::http::HeaderMap;

/// Name of the session cookie
pub const SESSION_COOKIE_NAME: &str = "lymphhub_session";

/// Lifetime used when the provider omits `expires_in`
pub const DEFAULT_SESSION_TTL_SECS: u64 = 300;

/// A fully specified `Set-Cookie` for the session.
///
/// `HttpOnly`, `Secure`, `SameSite=Lax` and `Path=/` are fixed; only the
/// value, domain and lifetime vary.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionCookie {
    pub value: String,
    pub domain: String,
    pub max_age_secs: u64,
}

impl SessionCookie {
    /// Render as a `Set-Cookie` header value
    pub fn to_header_string(&self) -> String {
        format!(
            "{}={}; Domain={}; Path=/; Max-Age={}; HttpOnly; Secure; SameSite=Lax",
            SESSION_COOKIE_NAME, self.value, self.domain, self.max_age_secs
        )
    }
}

/// Build the session cookie for a freshly issued token.
///
/// `ttl_secs` of `None` (provider did not report a lifetime) falls back to
/// [`DEFAULT_SESSION_TTL_SECS`].
pub fn encode(token: &str, ttl_secs: Option<u64>, domain: &str) -> SessionCookie {
    SessionCookie {
        value: token.to_string(),
        domain: domain.to_string(),
        max_age_secs: ttl_secs.unwrap_or(DEFAULT_SESSION_TTL_SECS),
    }
}

/// Cookie that makes the browser drop the session immediately
pub fn expired(domain: &str) -> SessionCookie {
    SessionCookie {
        value: String::new(),
        domain: domain.to_string(),
        max_age_secs: 0,
    }
}

/// Read the session token from request cookies. Absence (or an empty value)
/// is the unauthenticated state, not an error.
pub fn decode(headers: &HeaderMap) -> Option<String> {
    extract_cookie(headers, SESSION_COOKIE_NAME).filter(|value| !value.is_empty())
}

/// Extract a cookie value from headers
///
/// Handles multiple Cookie headers (some proxies fold/duplicate headers).
/// Uses `get_all` to collect all Cookie header values.
pub fn extract_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    let prefix = format!("{}=", name);

    // Iterate over all Cookie headers (proxies may send multiple)
    for header_value in headers.get_all(axum::http::header::COOKIE) {
        if let Ok(cookie_str) = header_value.to_str() {
            if let Some(value) = cookie_str
                .split(';')
                .map(|c| c.trim())
                .find_map(|c| c.strip_prefix(&prefix))
            {
                return Some(value.to_string());
            }
        }
    }
    None
}
