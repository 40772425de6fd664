//! Authentication module
//!
//! Forward-auth for the edge proxy plus the OIDC authorization code flow
//! that establishes sessions.
//!
//! ## Structure
//!
//! - `jwt`: token verification and signing-key caching
//! - `cookie`: session cookie encoding and lookup
//! - `redirect`: login URL construction and the redirect allow-list
//! - `provider`: the identity provider client built at startup
//! - `forward`: the forward-auth decision engine
//! - `extractors`: Axum extractors and the handler error type
//! - `handlers`: login, callback, logout and current-user handlers
//!
//! ## Authentication Flow
//!
//! 1. Edge proxy asks `/api/auth` → 200 with identity headers, 302 to Keycloak, or 401
//! 2. Keycloak authenticates → redirect to `/api/callback` with the original URL as state
//! 3. Gateway exchanges code for a token → sets session cookie → redirect to original URL

pub mod cookie;
pub mod extractors;
pub mod forward;
pub mod handlers;
pub mod jwt;
pub mod provider;
pub mod redirect;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export handlers for convenient routing
pub use forward::forward_auth_handler;
pub use handlers::{callback_handler, current_user_handler, login_handler, logout_handler};
