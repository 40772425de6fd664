use crate::auth::cookie;
use crate::auth::jwt::{Claims, VerificationError};
use crate::AppState;
use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::sync::Arc;

/// Errors surfaced at the handler boundary
#[derive(Debug)]
pub enum AuthError {
    /// No session cookie, or the session failed verification
    Unauthenticated(String),
    /// Authorization code could not be exchanged; the login flow must restart
    CallbackExchangeFailed(String),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        match self {
            AuthError::Unauthenticated(msg) => (
                StatusCode::UNAUTHORIZED,
                Json(json!({
                    "error": "Authentication required",
                    "message": msg,
                    "code": "UNAUTHENTICATED"
                })),
            )
                .into_response(),

            AuthError::CallbackExchangeFailed(msg) => (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "error": "Login failed",
                    "message": msg,
                    "code": "CALLBACK_EXCHANGE_FAILED"
                })),
            )
                .into_response(),
        }
    }
}

/// Authenticated user extractor - verifies the session cookie
///
/// Fails with [`AuthError::Unauthenticated`] when the cookie is missing or
/// does not verify. Handlers that also serve anonymous users take
/// `Result<AuthenticatedUser, AuthError>` instead.
pub struct AuthenticatedUser {
    pub token: String,
    pub claims: Claims,
}

impl FromRequestParts<Arc<AppState>> for AuthenticatedUser {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = cookie::decode(&parts.headers)
            .ok_or_else(|| AuthError::Unauthenticated("Missing session cookie".to_string()))?;

        match state.provider.verifier().verify(&token).await {
            Ok(claims) => {
                tracing::debug!(user = %claims.sub, "User authenticated via cookie");
                Ok(AuthenticatedUser { token, claims })
            }
            Err(e @ VerificationError::ProviderUnreachable(_)) => {
                tracing::error!(error = %e, "Cannot verify session; treating as unauthenticated");
                Err(AuthError::Unauthenticated(e.to_string()))
            }
            Err(e) => {
                tracing::warn!(reason = e.kind(), "Session cookie rejected");
                Err(AuthError::Unauthenticated(format!("Invalid session: {}", e)))
            }
        }
    }
}
