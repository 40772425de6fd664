//! Authentication handlers for login, callback, logout and session lookup
//!
//! - `login_handler`: starts the authorization code flow
//! - `callback_handler`: exchanges the code and establishes the session cookie
//! - `logout_handler`: drops the session cookie and ends the provider session
//! - `current_user_handler`: reports who the session cookie belongs to

use axum::{
    extract::{Query, State},
    http::{header::SET_COOKIE, HeaderValue},
    response::Response,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::cookie;
use super::extractors::{AuthError, AuthenticatedUser};
use super::forward::found;
use super::jwt::Identity;
use crate::AppState;

// =============================================================================
// Types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct LoginQuery {
    pub redirect_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CurrentUserResponse {
    pub authenticated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<Identity>,
    /// Userinfo profile data, when enrichment is enabled and the call succeeded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<serde_json::Value>,
}

// =============================================================================
// Handlers
// =============================================================================

/// `GET /api/login?redirect_url=<target>`
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LoginQuery>,
) -> Response {
    let requested = query.redirect_url.filter(|s| !s.is_empty());
    let target = state.redirect_policy.resolve(requested.as_deref());

    tracing::info!(
        event = "login_redirect",
        target = %target,
        realm = %state.config.keycloak_realm,
        "Redirecting to Keycloak for authentication"
    );

    found(state.provider.login_url(&target).as_str())
}

/// `GET /api/callback?code=<code>&state=<target>`
///
/// The state is checked against the redirect allow-list before use; an
/// untrusted target degrades to `/`. Failures are not retried.
pub async fn callback_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CallbackParams>,
) -> Result<Response, AuthError> {
    tracing::info!("OAuth callback received");

    // Provider-side failures (user denied consent, ...)
    if let Some(error) = params.error {
        tracing::warn!(
            event = "callback_provider_error",
            error = %error,
            description = ?params.error_description,
            "OAuth authorization failed"
        );
        let message = match params.error_description {
            Some(description) => format!("{}: {}", error, description),
            None => error,
        };
        return Err(AuthError::CallbackExchangeFailed(message));
    }

    let Some(code) = params.code.filter(|c| !c.is_empty()) else {
        tracing::warn!(event = "callback_missing_code", "No authorization code received");
        return Err(AuthError::CallbackExchangeFailed(
            "Missing authorization code".to_string(),
        ));
    };

    let requested = params.state.filter(|s| !s.is_empty());
    let target = state.redirect_policy.resolve(requested.as_deref());

    tracing::debug!(code_length = code.len(), "Exchanging authorization code for tokens");

    let token = state.provider.exchange_code(code).await.map_err(|e| {
        tracing::warn!(event = "callback_exchange_failed", error = %e, "Code exchange failed");
        AuthError::CallbackExchangeFailed(e.to_string())
    })?;

    let session_cookie = cookie::encode(
        &token.access_token,
        token.expires_in_secs,
        &state.config.cookie_domain,
    );
    let cookie_header = HeaderValue::from_str(&session_cookie.to_header_string()).map_err(|e| {
        tracing::error!(
            error = %e,
            value_len = token.access_token.len(),
            "Issued token cannot be stored in a cookie"
        );
        AuthError::CallbackExchangeFailed("Provider issued an unusable token".to_string())
    })?;

    tracing::info!(
        event = "session_established",
        max_age_secs = session_cookie.max_age_secs,
        target = %target,
        "Authentication successful, redirecting to original target"
    );

    let mut response = found(&target);
    response.headers_mut().insert(SET_COOKIE, cookie_header);
    Ok(response)
}

/// `GET /api/logout`
pub async fn logout_handler(State(state): State<Arc<AppState>>) -> Response {
    let post_logout = format!("{}/", state.config.public_url);
    let logout_url = state.provider.logout_url(&post_logout);

    tracing::info!(
        event = "logout_redirect",
        keycloak_realm = %state.config.keycloak_realm,
        "Clearing session and redirecting to Keycloak end-session"
    );

    let mut response = found(&logout_url);
    match HeaderValue::from_str(&cookie::expired(&state.config.cookie_domain).to_header_string()) {
        Ok(h) => {
            response.headers_mut().insert(SET_COOKIE, h);
        }
        Err(e) => tracing::error!(error = %e, "Failed to build session clearing cookie"),
    }
    response
}

/// `GET /api/user/me`
///
/// Trust comes from local token verification only; the userinfo call, when
/// enabled, adds profile data and never changes `authenticated`.
pub async fn current_user_handler(
    State(state): State<Arc<AppState>>,
    user: Result<AuthenticatedUser, AuthError>,
) -> Json<CurrentUserResponse> {
    let Ok(AuthenticatedUser { token, claims }) = user else {
        return Json(CurrentUserResponse {
            authenticated: false,
            user: None,
            profile: None,
        });
    };

    let profile = if state.config.userinfo_enrichment {
        match state.provider.userinfo(&token).await {
            Ok(profile) => Some(profile),
            Err(e) => {
                tracing::warn!(error = %e, sub = %claims.sub, "Userinfo lookup failed");
                None
            }
        }
    } else {
        None
    };

    Json(CurrentUserResponse {
        authenticated: true,
        user: Some(claims.identity()),
        profile,
    })
}
