//! Login redirect construction
//!
//! The URL the user originally asked for travels through the provider as the
//! OIDC `state` parameter. It is attacker-influenceable, so every consumer
//! runs it through [`RedirectPolicy`] before redirecting to it.

use axum::http::HeaderMap;
use oauth2::{CsrfToken, RedirectUrl, Scope};
use std::borrow::Cow;
use url::{Position, Url};

use super::provider::ConfiguredOAuthClient;

const RELATIVE_BASE: &str = "http://relative.invalid";

/// Scopes requested on every login
pub const LOGIN_SCOPES: &[&str] = &["openid", "email", "profile"];

/// State used when the original target is unknown or untrusted
pub const DEFAULT_STATE: &str = "/";

/// Build the provider authorization URL.
///
/// Produces `response_type=code`, `client_id`, `redirect_uri`, `scope` and
/// `state`, all URL-encoded.
pub fn build_login_url(
    client: &ConfiguredOAuthClient,
    callback_url: &RedirectUrl,
    scopes: &[&str],
    state: &str,
) -> Url {
    let state = state.to_string();
    let (auth_url, _) = client
        .authorize_url(move || CsrfToken::new(state))
        .set_redirect_uri(Cow::Borrowed(callback_url))
        .add_scopes(scopes.iter().map(|s| Scope::new(s.to_string())))
        .url();
    auth_url
}

/// Reconstruct the URL the user requested from the edge proxy's forwarding
/// headers.
///
/// Without `X-Forwarded-Host` only the path-relative `X-Forwarded-Uri` is
/// known. Proxies that append to these headers produce comma lists; the
/// first entry is the client-facing one.
pub fn original_url(headers: &HeaderMap) -> String {
    let forwarded = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };

    let uri = match forwarded("x-forwarded-uri") {
        Some(uri) if uri.starts_with('/') => uri,
        Some(uri) => format!("/{}", uri),
        None => DEFAULT_STATE.to_string(),
    };

    let Some(host) = forwarded("x-forwarded-host") else {
        return uri;
    };

    let proto = match forwarded("x-forwarded-proto").map(|p| p.to_ascii_lowercase()) {
        Some(p) if p == "https" => "https",
        _ => "http",
    };

    match Url::parse(&format!("{}://{}{}", proto, host, uri)) {
        Ok(url) => url.to_string(),
        Err(e) => {
            tracing::debug!(
                host = %host,
                error = %e,
                "Forwarded host does not form a valid URL; using path only"
            );
            uri
        }
    }
}

/// Allow-list of post-login redirect targets
#[derive(Debug, Clone)]
pub struct RedirectPolicy {
    /// Exact hosts, or `.domain` entries matching the domain and all
    /// subdomains. Lowercase.
    trusted_hosts: Vec<String>,
}

impl RedirectPolicy {
    pub fn new(trusted_hosts: Vec<String>) -> Self {
        Self {
            trusted_hosts: trusted_hosts
                .into_iter()
                .map(|h| h.to_ascii_lowercase())
                .collect(),
        }
    }

    /// Return the normalized target if it may be redirected to.
    ///
    /// Path-relative targets stay on this host and are always allowed, except
    /// for forms browsers resolve to another host (`//evil`, `/\evil`).
    /// Absolute targets must be http(s), carry no credentials, and point at a
    /// trusted host.
    pub fn check(&self, target: &str) -> Option<String> {
        if target.chars().any(|c| c.is_control()) {
            return None;
        }

        if target.starts_with('/') {
            if target.starts_with("//") || target.contains('\\') {
                return None;
            }
            // Resolve against a placeholder origin to percent-encode and
            // normalize the path; it must stay on the placeholder host.
            let base = Url::parse(RELATIVE_BASE).ok()?;
            let resolved = base.join(target).ok()?;
            if resolved.origin() != base.origin() {
                return None;
            }
            // Dot-segment removal can turn `/..//evil` into `//evil`
            let normalized = &resolved[Position::BeforePath..];
            if normalized.starts_with("//") || normalized.contains('\\') {
                return None;
            }
            return Some(normalized.to_string());
        }

        let url = Url::parse(target).ok()?;
        if !matches!(url.scheme(), "http" | "https") {
            return None;
        }
        if !url.username().is_empty() || url.password().is_some() {
            return None;
        }
        let host = url.host_str()?;
        if self.is_trusted_host(host) {
            Some(url.to_string())
        } else {
            None
        }
    }

    /// Resolve an optional state value to a safe redirect target, falling
    /// back to [`DEFAULT_STATE`].
    pub fn resolve(&self, state: Option<&str>) -> String {
        match state {
            None => DEFAULT_STATE.to_string(),
            Some(target) => self.check(target).unwrap_or_else(|| {
                tracing::warn!(
                    event = "redirect_target_rejected",
                    target = %target,
                    "Redirect target is not on a trusted host; using default"
                );
                DEFAULT_STATE.to_string()
            }),
        }
    }

    fn is_trusted_host(&self, host: &str) -> bool {
        let host = host.to_ascii_lowercase();
        self.trusted_hosts.iter().any(|entry| match entry.strip_prefix('.') {
            Some(domain) => host == domain || host.ends_with(entry.as_str()),
            None => host == *entry,
        })
    }
}
