//! Forward-authentication gateway library
//!
//! Provides the edge-auth checks, the OIDC login flow and the service
//! directory served by the gateway.

#![deny(dead_code)]

pub mod auth;
pub mod config;
pub mod services;
pub mod web;

use auth::provider::IdentityProvider;
use auth::redirect::RedirectPolicy;
use config::Config;
use services::ServiceEntry;
use std::sync::Arc;

pub struct AppState {
    pub config: Arc<Config>,
    /// Provider client and signing-key cache, built once at startup
    pub provider: Arc<IdentityProvider>,
    pub redirect_policy: RedirectPolicy,
    pub services: Arc<Vec<ServiceEntry>>,
}

impl AppState {
    pub fn new(config: Config, provider: IdentityProvider, services: Vec<ServiceEntry>) -> Self {
        let redirect_policy = RedirectPolicy::new(config.trusted_redirect_hosts.clone());
        Self {
            config: Arc::new(config),
            provider: Arc::new(provider),
            redirect_policy,
            services: Arc::new(services),
        }
    }
}
