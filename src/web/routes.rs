use super::handlers::{health_handler, ready_handler, services_handler};
use crate::{
    auth::{
        callback_handler, current_user_handler, forward_auth_handler, login_handler,
        logout_handler,
    },
    AppState,
};
use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(health_handler))
        .route("/api/ready", get(ready_handler))
        .route("/api/auth", get(forward_auth_handler))
        .route("/api/login", get(login_handler))
        .route("/api/callback", get(callback_handler))
        .route("/api/logout", get(logout_handler))
        .route("/api/user/me", get(current_user_handler))
        .route("/api/services", get(services_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
