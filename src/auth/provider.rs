//! Identity provider client
//!
//! One [`IdentityProvider`] is built in `main` and shared through
//! `AppState`. It owns the HTTP client (with timeouts), the OAuth2 client,
//! and the token verifier with its key cache. There is no lazily created
//! global instance.

use anyhow::Context;
use oauth2::{
    basic::BasicClient, AuthUrl, AuthorizationCode, ClientId, ClientSecret, EndpointNotSet,
    EndpointSet, RedirectUrl, RequestTokenError, TokenResponse, TokenUrl,
};
use std::time::Duration;
use url::Url;

use super::jwt::TokenVerifier;
use super::redirect::{build_login_url, LOGIN_SCOPES};
use crate::config::Config;

/// OAuth2 client with authorization and token endpoints configured
pub type ConfiguredOAuthClient =
    BasicClient<EndpointSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

/// Realm endpoints, following Keycloak's URL layout.
///
/// Browser-facing endpoints use the public URL; server-to-server endpoints
/// use the internal URL.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderEndpoints {
    pub authorization: String,
    pub end_session: String,
    pub token: String,
    pub jwks: String,
    pub userinfo: String,
}

impl ProviderEndpoints {
    pub fn keycloak(internal_url: &str, public_url: &str, realm: &str) -> Self {
        let internal = format!("{}/realms/{}/protocol/openid-connect", internal_url, realm);
        let public = format!("{}/realms/{}/protocol/openid-connect", public_url, realm);
        Self {
            authorization: format!("{}/auth", public),
            end_session: format!("{}/logout", public),
            token: format!("{}/token", internal),
            jwks: format!("{}/certs", internal),
            userinfo: format!("{}/userinfo", internal),
        }
    }
}

/// Result of a successful code exchange
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub access_token: String,
    /// Lifetime reported by the provider, if any
    pub expires_in_secs: Option<u64>,
}

#[derive(Debug, thiserror::Error)]
pub enum ExchangeError {
    /// The provider answered with an OAuth2 error (invalid or expired code, ...)
    #[error("authorization code rejected: {0}")]
    Rejected(String),
    /// Network failure, timeout, or an unparseable response
    #[error("token endpoint unavailable: {0}")]
    Unavailable(String),
}

pub struct IdentityProvider {
    endpoints: ProviderEndpoints,
    client_id: String,
    callback_url: RedirectUrl,
    oauth_client: ConfiguredOAuthClient,
    http_client: reqwest::Client,
    verifier: TokenVerifier,
}

impl IdentityProvider {
    /// Build the provider client from configuration. Performs no network I/O.
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let endpoints = ProviderEndpoints::keycloak(
            &config.keycloak_url,
            &config.keycloak_public_url,
            &config.keycloak_realm,
        );

        let http_client = create_http_client(
            config.http_connect_timeout_secs,
            config.http_request_timeout_secs,
        )
        .context("Failed to build HTTP client for identity provider")?;

        let callback_url =
            RedirectUrl::new(config.callback_url()).context("Invalid callback URL")?;

        let oauth_client = BasicClient::new(ClientId::new(config.client_id.clone()))
            .set_client_secret(ClientSecret::new(config.client_secret.clone()))
            .set_auth_uri(AuthUrl::new(endpoints.authorization.clone()).context("Invalid auth URL")?)
            .set_token_uri(TokenUrl::new(endpoints.token.clone()).context("Invalid token URL")?)
            .set_redirect_uri(callback_url.clone());

        let verifier = TokenVerifier::new(
            endpoints.jwks.clone(),
            config.expected_issuer(),
            config.client_id.clone(),
            http_client.clone(),
            Duration::from_secs(config.jwks_cache_ttl_secs),
            Duration::from_secs(config.jwks_min_refresh_interval_secs),
        );

        Ok(Self {
            endpoints,
            client_id: config.client_id.clone(),
            callback_url,
            oauth_client,
            http_client,
            verifier,
        })
    }

    pub fn verifier(&self) -> &TokenVerifier {
        &self.verifier
    }

    pub fn endpoints(&self) -> &ProviderEndpoints {
        &self.endpoints
    }

    /// Authorization URL carrying `state` back to the callback
    pub fn login_url(&self, state: &str) -> Url {
        build_login_url(&self.oauth_client, &self.callback_url, LOGIN_SCOPES, state)
    }

    /// Exchange an authorization code at the token endpoint.
    ///
    /// Uses the same callback URL the login redirect was built with; the
    /// provider rejects the exchange otherwise.
    pub async fn exchange_code(&self, code: String) -> Result<IssuedToken, ExchangeError> {
        let token_response = self
            .oauth_client
            .exchange_code(AuthorizationCode::new(code))
            .request_async(&self.http_client)
            .await
            .map_err(|e| match e {
                RequestTokenError::ServerResponse(response) => {
                    let mut message = response.error().to_string();
                    if let Some(description) = response.error_description() {
                        message = format!("{}: {}", message, description);
                    }
                    ExchangeError::Rejected(message)
                }
                other => ExchangeError::Unavailable(other.to_string()),
            })?;

        Ok(IssuedToken {
            access_token: token_response.access_token().secret().to_string(),
            expires_in_secs: token_response.expires_in().map(|d| d.as_secs()),
        })
    }

    /// Fetch profile data from the userinfo endpoint.
    ///
    /// Never used to decide whether a token is valid; callers must have
    /// verified the token first.
    pub async fn userinfo(&self, access_token: &str) -> anyhow::Result<serde_json::Value> {
        let profile = self
            .http_client
            .get(&self.endpoints.userinfo)
            .bearer_auth(access_token)
            .send()
            .await
            .context("Failed to call userinfo endpoint")?
            .error_for_status()
            .context("Userinfo endpoint returned an error")?
            .json()
            .await
            .context("Failed to parse userinfo response")?;
        Ok(profile)
    }

    /// End-session URL; Keycloak requires `client_id` alongside
    /// `post_logout_redirect_uri` when no id_token_hint is sent.
    pub fn logout_url(&self, post_logout_redirect_uri: &str) -> String {
        format!(
            "{}?client_id={}&post_logout_redirect_uri={}",
            self.endpoints.end_session,
            urlencoding::encode(&self.client_id),
            urlencoding::encode(post_logout_redirect_uri)
        )
    }
}

/// Create a reqwest client for provider calls using config timeouts
pub fn create_http_client(
    connect_timeout_secs: u64,
    request_timeout_secs: u64,
) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::ClientBuilder::new()
        .redirect(reqwest::redirect::Policy::none()) // Security: prevent SSRF
        .connect_timeout(Duration::from_secs(connect_timeout_secs))
        .timeout(Duration::from_secs(request_timeout_secs))
        .build()
}
