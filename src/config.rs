use std::env;

/// Source for the service directory
#[derive(Debug, Clone, PartialEq)]
pub enum ServicesSource {
    /// Built-in list compiled into the binary
    Builtin,
    /// Directory provided as JSON string via SERVICES_JSON env var
    Json(String),
    /// Directory loaded from file path via SERVICES_PATH env var
    File(String),
}

#[derive(Debug, Clone)]
pub struct Config {
    // Server configuration
    pub server_host: String,
    pub server_port: u16,

    // Public base URL of this gateway (callback and logout targets hang off it)
    pub public_url: String,

    // Keycloak configuration
    pub keycloak_url: String, // Server-to-server URL (token, certs, userinfo)
    pub keycloak_public_url: String, // Browser-visible URL (auth, logout, issuer)
    pub keycloak_realm: String,
    pub client_id: String,
    pub client_secret: String,

    // Parent domain shared by every protected subdomain
    pub cookie_domain: String,

    // Hosts a post-login redirect may point at. A leading '.' matches the
    // domain itself and any subdomain.
    pub trusted_redirect_hosts: Vec<String>,

    // HTTP client timeout configuration (in seconds)
    pub http_connect_timeout_secs: u64,
    pub http_request_timeout_secs: u64,

    // JWKS cache configuration (in seconds)
    pub jwks_cache_ttl_secs: u64,
    pub jwks_min_refresh_interval_secs: u64,

    // Fetch userinfo profile data for /api/user/me
    pub userinfo_enrichment: bool,

    pub services: ServicesSource,
}

impl Config {
    /// Load configuration from environment variables
    pub fn load() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable lookup.
    ///
    /// `load` passes the process environment; tests pass a map.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let required = |key: &str| {
            var(key).ok_or_else(|| anyhow::anyhow!("{} environment variable is required", key))
        };
        let number = |key: &str, default: u64| {
            var(key)
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(default)
        };

        // Normalize URLs by trimming trailing slashes to prevent double-slash issues
        let keycloak_url = normalize_base_url("KEYCLOAK_URL", &required("KEYCLOAK_URL")?)?;
        let keycloak_public_url = match var("KEYCLOAK_PUBLIC_URL") {
            Some(url) => normalize_base_url("KEYCLOAK_PUBLIC_URL", &url)?,
            None => keycloak_url.clone(),
        };
        let keycloak_realm = required("KEYCLOAK_REALM")?;
        let client_id = required("KEYCLOAK_CLIENT_ID")?;
        let client_secret = required("KEYCLOAK_CLIENT_SECRET")?;
        let public_url = normalize_base_url("PUBLIC_URL", &required("PUBLIC_URL")?)?;
        let cookie_domain = required("COOKIE_DOMAIN")?;

        let trusted_redirect_hosts = match var("TRUSTED_REDIRECT_HOSTS") {
            Some(list) => list
                .split(',')
                .map(|h| h.trim().to_ascii_lowercase())
                .filter(|h| !h.is_empty())
                .collect(),
            None => default_trusted_hosts(&public_url, &cookie_domain),
        };

        let server_host = var("SERVER_HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let server_port = var("SERVER_PORT")
            .and_then(|s| s.parse::<u16>().ok())
            .unwrap_or(3000);

        let userinfo_enrichment = var("USERINFO_ENRICHMENT")
            .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
            .unwrap_or(false);

        // Service directory (primary: JSON env var, fallback: file path, else built-in)
        let services = if let Some(json) = var("SERVICES_JSON") {
            ServicesSource::Json(json)
        } else if let Some(path) = var("SERVICES_PATH") {
            ServicesSource::File(path)
        } else {
            ServicesSource::Builtin
        };

        Ok(Config {
            server_host,
            server_port,
            public_url,
            keycloak_url,
            keycloak_public_url,
            keycloak_realm,
            client_id,
            client_secret,
            cookie_domain,
            trusted_redirect_hosts,
            http_connect_timeout_secs: number("HTTP_CONNECT_TIMEOUT_SECS", 5),
            http_request_timeout_secs: number("HTTP_REQUEST_TIMEOUT_SECS", 10),
            jwks_cache_ttl_secs: number("JWKS_CACHE_TTL_SECS", 600),
            jwks_min_refresh_interval_secs: number("JWKS_MIN_REFRESH_INTERVAL_SECS", 10),
            userinfo_enrichment,
            services,
        })
    }

    /// Callback URL registered with the provider. Must be byte-identical for
    /// the authorization request and the code exchange.
    pub fn callback_url(&self) -> String {
        format!("{}/api/callback", self.public_url)
    }

    /// Expected `iss` claim: {keycloak_public_url}/realms/{realm}
    pub fn expected_issuer(&self) -> String {
        format!("{}/realms/{}", self.keycloak_public_url, self.keycloak_realm)
    }

    /// Get bind address for server
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}

fn normalize_base_url(key: &str, value: &str) -> anyhow::Result<String> {
    let parsed = url::Url::parse(value)
        .map_err(|e| anyhow::anyhow!("{} is not a valid URL ({}): {}", key, value, e))?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        anyhow::bail!("{} must be an absolute http(s) URL: {}", key, value);
    }
    Ok(value.trim_end_matches('/').to_string())
}

/// The gateway's own host plus everything under the cookie domain
fn default_trusted_hosts(public_url: &str, cookie_domain: &str) -> Vec<String> {
    let mut hosts = Vec::new();
    if let Some(host) = url::Url::parse(public_url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_ascii_lowercase()))
    {
        hosts.push(host);
    }
    let domain = cookie_domain.trim_start_matches('.').to_ascii_lowercase();
    if !domain.is_empty() {
        hosts.push(format!(".{}", domain));
    }
    hosts
}
