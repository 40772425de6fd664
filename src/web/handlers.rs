use crate::{services::ServiceEntry, AppState};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;
use std::sync::Arc;

/// Liveness probe - always returns OK if the process is running
pub async fn health_handler() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// Readiness probe
///
/// Returns 200 OK once the JWKS cache has been populated (Keycloak is
/// reachable), 503 Service Unavailable before that.
pub async fn ready_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    if state.provider.verifier().is_jwks_cached().await {
        (StatusCode::OK, "ready")
    } else {
        tracing::warn!("Readiness check failed: JWKS not cached");
        (StatusCode::SERVICE_UNAVAILABLE, "not ready: JWKS not cached")
    }
}

/// Static service directory; identical for every caller
pub async fn services_handler(State(state): State<Arc<AppState>>) -> Json<Vec<ServiceEntry>> {
    Json(state.services.as_ref().clone())
}
