use anyhow::Result;
use edge_gateway::{auth::provider::IdentityProvider, config::Config, services, web, AppState};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting forward-auth gateway");

    // Load configuration from environment
    let config = Config::load()?;
    tracing::info!(
        keycloak_realm = %config.keycloak_realm,
        public_url = %config.public_url,
        cookie_domain = %config.cookie_domain,
        trusted_redirect_hosts = ?config.trusted_redirect_hosts,
        "Configuration loaded"
    );

    // Provider client and key cache are created here, once, and shared
    let provider = IdentityProvider::new(&config)?;

    // Prefetch JWKS so the first forward-auth check does not pay for it.
    // Failure is not fatal: requests fail closed until keys can be fetched.
    match provider.verifier().prefetch_jwks().await {
        Ok(()) => tracing::info!("JWKS prefetched successfully - readiness check will pass"),
        Err(e) => tracing::warn!(error = %e, "Failed to prefetch JWKS at startup"),
    }

    let services = services::load_services(&config.services)?;

    let bind_address = config.bind_address();
    let state = Arc::new(AppState::new(config, provider, services));
    let app = web::create_router(state);

    // Bind and serve
    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    tracing::info!("Gateway listening on {}", bind_address);

    axum::serve(listener, app).await?;

    Ok(())
}
