//! Forward-auth decision engine
//!
//! The edge proxy calls `/api/auth` before forwarding each request. The
//! answer is exactly one of: 200 with identity headers, 302 to the login
//! page, or a bare 401 for callers that cannot follow a login redirect.

use axum::{
    extract::State,
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use url::Url;

use super::cookie;
use super::jwt::{Claims, Identity, VerificationError};
use super::redirect::{original_url, RedirectPolicy};
use crate::AppState;

pub const X_AUTH_USER: HeaderName = HeaderName::from_static("x-auth-user");
pub const X_AUTH_EMAIL: HeaderName = HeaderName::from_static("x-auth-email");
pub const X_AUTH_NAME: HeaderName = HeaderName::from_static("x-auth-name");

/// Session state of one inbound request
#[derive(Debug)]
pub enum SessionState {
    NoSession,
    Verified(Claims),
    Invalid(VerificationError),
}

/// Terminal outcome of a forward-auth check
#[derive(Debug, PartialEq)]
pub enum Decision {
    Allow(Identity),
    RedirectToLogin(Url),
    Reject,
}

/// Browser navigations accept HTML; API clients get a bare 401 instead of a
/// redirect they cannot follow.
pub fn is_browser_navigation(headers: &HeaderMap) -> bool {
    headers
        .get_all(axum::http::header::ACCEPT)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .any(|accept| accept.contains("text/html"))
}

/// Decide the outcome for a request.
///
/// Invalid sessions are handled exactly like missing ones, including
/// propagating the original URL so the user lands where they were going
/// after logging in again.
pub fn decide<F>(
    session: SessionState,
    headers: &HeaderMap,
    policy: &RedirectPolicy,
    login_url: F,
) -> Decision
where
    F: FnOnce(&str) -> Url,
{
    match session {
        SessionState::Verified(claims) => Decision::Allow(claims.identity()),
        SessionState::NoSession | SessionState::Invalid(_) => {
            if is_browser_navigation(headers) {
                let target = original_url(headers);
                let state = policy.resolve(Some(&target));
                Decision::RedirectToLogin(login_url(&state))
            } else {
                Decision::Reject
            }
        }
    }
}

impl IntoResponse for Decision {
    fn into_response(self) -> Response {
        match self {
            Decision::Allow(identity) => {
                let mut response = StatusCode::OK.into_response();
                let headers = response.headers_mut();
                headers.insert(X_AUTH_USER, identity_header(&identity.username));
                headers.insert(X_AUTH_EMAIL, identity_header(&identity.email));
                headers.insert(X_AUTH_NAME, identity_header(&identity.name));
                response
            }
            Decision::RedirectToLogin(url) => found(url.as_str()),
            Decision::Reject => StatusCode::UNAUTHORIZED.into_response(),
        }
    }
}

/// 302 Found with a Location header
pub fn found(location: &str) -> Response {
    let location = HeaderValue::from_str(location).unwrap_or_else(|e| {
        tracing::error!(error = %e, "Redirect target is not a valid header value");
        HeaderValue::from_static("/")
    });
    (StatusCode::FOUND, [(axum::http::header::LOCATION, location)]).into_response()
}

/// Claim values may hold any UTF-8; only control characters make a value
/// unrepresentable, in which case the header is sent empty.
fn identity_header(value: &str) -> HeaderValue {
    HeaderValue::from_bytes(value.as_bytes()).unwrap_or_else(|_| {
        tracing::warn!(value_len = value.len(), "Claim contains control characters; header left empty");
        HeaderValue::from_static("")
    })
}

/// `GET /api/auth`
pub async fn forward_auth_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Response {
    let session = match cookie::decode(&headers) {
        None => {
            tracing::debug!(event = "forward_auth_no_session", "No session cookie");
            SessionState::NoSession
        }
        Some(token) => match state.provider.verifier().verify(&token).await {
            Ok(claims) => SessionState::Verified(claims),
            Err(VerificationError::ProviderUnreachable(reason)) => {
                tracing::error!(
                    event = "forward_auth_provider_unreachable",
                    reason = %reason,
                    "Cannot verify session; failing closed"
                );
                SessionState::Invalid(VerificationError::ProviderUnreachable(reason))
            }
            Err(e) => {
                tracing::warn!(
                    event = "forward_auth_invalid_session",
                    reason = e.kind(),
                    "Session rejected"
                );
                SessionState::Invalid(e)
            }
        },
    };

    let decision = decide(session, &headers, &state.redirect_policy, |target| {
        state.provider.login_url(target)
    });

    match &decision {
        Decision::Allow(identity) => tracing::debug!(
            event = "forward_auth_allow",
            sub = %identity.sub,
            username = %identity.username,
            "Request authorized"
        ),
        Decision::RedirectToLogin(_) => {
            tracing::debug!(event = "forward_auth_redirect", "Redirecting to login")
        }
        Decision::Reject => tracing::debug!(event = "forward_auth_reject", "Rejecting with 401"),
    }

    decision.into_response()
}
