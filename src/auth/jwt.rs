//! Session token verification
//!
//! Tokens are always verified locally: signature against the realm's
//! published keys, then issuer, expiry and audience. The key set is cached
//! and refreshed at most once per cache miss no matter how many requests
//! are waiting on it.

use jsonwebtoken::{decode, decode_header, errors::ErrorKind, jwk::Jwk, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};

/// Tolerated clock difference between the provider and this host
pub const CLOCK_SKEW_LEEWAY_SECS: u64 = 5;

/// Only asymmetric algorithms are accepted; HMAC would let anyone holding the
/// public key mint tokens.
const ACCEPTED_ALGORITHMS: &[Algorithm] = &[
    Algorithm::RS256,
    Algorithm::RS384,
    Algorithm::RS512,
    Algorithm::PS256,
    Algorithm::PS384,
    Algorithm::PS512,
    Algorithm::ES256,
    Algorithm::ES384,
    Algorithm::EdDSA,
];

/// `aud` is either a single string or an array of strings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    One(String),
    Many(Vec<String>),
}

impl Audience {
    pub fn contains(&self, value: &str) -> bool {
        match self {
            Audience::One(aud) => aud == value,
            Audience::Many(auds) => auds.iter().any(|a| a == value),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub iss: String,
    pub exp: u64,
    #[serde(default)]
    pub aud: Option<Audience>,
    /// Authorized party; Keycloak puts the requesting client here
    #[serde(default)]
    pub azp: Option<String>,
    #[serde(default)]
    pub preferred_username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

impl Claims {
    /// The token was issued for `client_id` if it names it as audience or as
    /// authorized party.
    pub fn is_intended_for(&self, client_id: &str) -> bool {
        self.aud.as_ref().is_some_and(|aud| aud.contains(client_id))
            || self.azp.as_deref() == Some(client_id)
    }

    /// Read-only projection forwarded to upstream services
    pub fn identity(&self) -> Identity {
        Identity {
            sub: self.sub.clone(),
            username: self.preferred_username.clone().unwrap_or_default(),
            email: self.email.clone().unwrap_or_default(),
            name: self.name.clone().unwrap_or_default(),
        }
    }
}

/// Identity claims of an authenticated user
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Identity {
    pub sub: String,
    pub username: String,
    pub email: String,
    pub name: String,
}

/// Why a token was not accepted
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerificationError {
    #[error("token has expired")]
    Expired,
    #[error("token signature is invalid")]
    BadSignature,
    #[error("token was not issued for this client")]
    AudienceMismatch,
    #[error("token was issued by an unexpected issuer")]
    IssuerMismatch,
    #[error("no signing key with kid {0}")]
    UnknownKey(String),
    #[error("malformed token: {0}")]
    Malformed(String),
    #[error("identity provider unreachable: {0}")]
    ProviderUnreachable(String),
}

impl VerificationError {
    /// Short stable label for structured logs
    pub fn kind(&self) -> &'static str {
        match self {
            VerificationError::Expired => "expired",
            VerificationError::BadSignature => "bad_signature",
            VerificationError::AudienceMismatch => "audience_mismatch",
            VerificationError::IssuerMismatch => "issuer_mismatch",
            VerificationError::UnknownKey(_) => "unknown_key",
            VerificationError::Malformed(_) => "malformed",
            VerificationError::ProviderUnreachable(_) => "provider_unreachable",
        }
    }
}

#[derive(Debug, Deserialize)]
struct JwksResponse {
    keys: Vec<serde_json::Value>,
}

#[derive(Clone)]
struct SigningKey {
    key: DecodingKey,
    /// Algorithm pinned by the JWK, if it declares one
    alg: Option<Algorithm>,
}

struct JwksCache {
    keys: HashMap<String, SigningKey>,
    fetched_at: Instant,
}

#[derive(Default)]
struct KeyCache {
    jwks: Option<JwksCache>,
    /// Bumped when a refresh finishes, successful or not; lets waiters
    /// detect that someone else already tried while they were queued.
    refresh_attempts: u64,
}

pub struct TokenVerifier {
    jwks_url: String,
    /// Expected issuer URL (Keycloak public URL + realm path)
    expected_issuer: String,
    /// Expected audience (the client_id)
    expected_audience: String,
    client: reqwest::Client,
    jwks_cache: RwLock<KeyCache>,
    /// Serializes refreshes; holds the error of the last attempt if it failed
    refresh_lock: Mutex<Option<VerificationError>>,
    cache_ttl: Duration,
    min_refresh_interval: Duration,
}

impl TokenVerifier {
    /// Create a verifier for one realm/client pair.
    ///
    /// `client` must already carry connect and request timeouts; a hung
    /// key fetch is reported as [`VerificationError::ProviderUnreachable`].
    pub fn new(
        jwks_url: String,
        expected_issuer: String,
        expected_audience: String,
        client: reqwest::Client,
        cache_ttl: Duration,
        min_refresh_interval: Duration,
    ) -> Self {
        tracing::info!(
            jwks_url = %jwks_url,
            expected_issuer = %expected_issuer,
            expected_audience = %expected_audience,
            jwks_cache_ttl_secs = cache_ttl.as_secs(),
            "Token verifier initialized"
        );

        Self {
            jwks_url,
            expected_issuer,
            expected_audience,
            client,
            jwks_cache: RwLock::new(KeyCache::default()),
            refresh_lock: Mutex::new(None),
            cache_ttl,
            min_refresh_interval,
        }
    }

    /// Verify a session token and return its claims
    pub async fn verify(&self, token: &str) -> Result<Claims, VerificationError> {
        let header = decode_header(token)
            .map_err(|e| VerificationError::Malformed(format!("invalid header: {}", e)))?;

        if !ACCEPTED_ALGORITHMS.contains(&header.alg) {
            return Err(VerificationError::Malformed(format!(
                "algorithm {:?} is not accepted",
                header.alg
            )));
        }

        let kid = header
            .kid
            .ok_or_else(|| VerificationError::Malformed("token missing kid".to_string()))?;

        let signing_key = self.signing_key(&kid).await?;
        if signing_key.alg.is_some_and(|alg| alg != header.alg) {
            tracing::warn!(
                kid = %kid,
                token_alg = ?header.alg,
                key_alg = ?signing_key.alg,
                "Token algorithm does not match the published key"
            );
            return Err(VerificationError::BadSignature);
        }

        let mut validation = Validation::new(header.alg);
        validation.leeway = CLOCK_SKEW_LEEWAY_SECS;
        validation.validate_exp = true;
        validation.set_issuer(&[&self.expected_issuer]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);
        // Audience is checked below so that `azp` counts as well
        validation.validate_aud = false;

        let claims = match decode::<Claims>(token, &signing_key.key, &validation) {
            Ok(data) => data.claims,
            Err(e) => {
                let error = classify(e.kind());
                let token_hash = format!("{:x}", md5::compute(token));
                tracing::warn!(
                    reason = error.kind(),
                    error = %e,
                    kid = %kid,
                    alg = ?header.alg,
                    token_hash = %token_hash,
                    token_len = token.len(),
                    "Token rejected"
                );
                return Err(error);
            }
        };

        if !claims.is_intended_for(&self.expected_audience) {
            tracing::warn!(
                sub = %claims.sub,
                aud = ?claims.aud,
                azp = ?claims.azp,
                expected_audience = %self.expected_audience,
                "Token rejected: audience mismatch"
            );
            return Err(VerificationError::AudienceMismatch);
        }

        tracing::debug!(
            sub = %claims.sub,
            username = ?claims.preferred_username,
            "Token verified"
        );

        Ok(claims)
    }

    /// Check if JWKS is cached (for readiness checks)
    pub async fn is_jwks_cached(&self) -> bool {
        self.jwks_cache.read().await.jwks.is_some()
    }

    /// Fetch the key set now instead of on the first request
    pub async fn prefetch_jwks(&self) -> Result<(), VerificationError> {
        let observed = self.jwks_cache.read().await.refresh_attempts;
        self.refresh_jwks(observed).await
    }

    /// Look up `kid`, refreshing the key set when it is stale or when an
    /// unknown kid suggests the provider rotated its keys.
    async fn signing_key(&self, kid: &str) -> Result<SigningKey, VerificationError> {
        let observed_attempts = {
            let cache = self.jwks_cache.read().await;
            match cache.jwks.as_ref() {
                Some(jwks) if jwks.fetched_at.elapsed() < self.cache_ttl => {
                    if let Some(key) = jwks.keys.get(kid) {
                        return Ok(key.clone());
                    }
                    if jwks.fetched_at.elapsed() < self.min_refresh_interval {
                        tracing::warn!(
                            kid = %kid,
                            "Unknown key ID; JWKS was refreshed too recently to retry"
                        );
                        return Err(VerificationError::UnknownKey(kid.to_string()));
                    }
                    tracing::warn!(kid = %kid, "Key ID not found in cache, forcing JWKS refresh");
                }
                Some(jwks) => {
                    tracing::info!(
                        elapsed_secs = jwks.fetched_at.elapsed().as_secs(),
                        ttl_secs = self.cache_ttl.as_secs(),
                        "JWKS cache expired, will refresh"
                    );
                }
                None => {}
            }
            cache.refresh_attempts
        }; // Lock is dropped here

        self.refresh_jwks(observed_attempts).await?;

        let cache = self.jwks_cache.read().await;
        match cache.jwks.as_ref().and_then(|c| c.keys.get(kid)) {
            Some(key) => Ok(key.clone()),
            None => {
                let available_kids: Vec<_> = cache
                    .jwks
                    .as_ref()
                    .map(|c| c.keys.keys().collect())
                    .unwrap_or_default();
                tracing::warn!(
                    kid = %kid,
                    available_kids = ?available_kids,
                    "Unknown key ID - kid not found in JWKS even after refresh"
                );
                Err(VerificationError::UnknownKey(kid.to_string()))
            }
        }
    }

    /// Refresh the key set unless another task finished a refresh since the
    /// caller looked at the cache (`observed_attempts`). Waiters queued behind
    /// that refresh share its outcome, failures included, instead of each
    /// calling the provider in turn.
    async fn refresh_jwks(&self, observed_attempts: u64) -> Result<(), VerificationError> {
        let mut last_failure = self.refresh_lock.lock().await;

        {
            let cache = self.jwks_cache.read().await;
            if cache.refresh_attempts != observed_attempts {
                tracing::debug!(
                    refresh_attempts = cache.refresh_attempts,
                    failed = last_failure.is_some(),
                    "JWKS already refreshed by a concurrent request"
                );
                return match last_failure.as_ref() {
                    Some(error) => Err(error.clone()),
                    None => Ok(()),
                };
            }
        }

        let fetched = self.fetch_jwks().await;

        let mut cache = self.jwks_cache.write().await;
        cache.refresh_attempts += 1;
        match fetched {
            Ok(keys) => {
                cache.jwks = Some(JwksCache {
                    keys,
                    fetched_at: Instant::now(),
                });
                *last_failure = None;
                Ok(())
            }
            Err(error) => {
                *last_failure = Some(error.clone());
                Err(error)
            }
        }
    }

    async fn fetch_jwks(&self) -> Result<HashMap<String, SigningKey>, VerificationError> {
        tracing::info!(url = %self.jwks_url, "Fetching JWKS from Keycloak");

        let unreachable = |context: &str, e: reqwest::Error| {
            tracing::error!(url = %self.jwks_url, error = %e, timeout = e.is_timeout(), "{}", context);
            VerificationError::ProviderUnreachable(format!("{}: {}", context, e))
        };

        let response: JwksResponse = self
            .client
            .get(&self.jwks_url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| unreachable("Failed to fetch JWKS", e))?
            .json()
            .await
            .map_err(|e| unreachable("Failed to parse JWKS", e))?;

        let mut keys = HashMap::new();
        for value in response.keys {
            if let Some((kid, key)) = parse_signing_key(value) {
                tracing::debug!(kid = %kid, "Added key to cache");
                keys.insert(kid, key);
            }
        }

        if keys.is_empty() {
            tracing::warn!(url = %self.jwks_url, "JWKS contains no usable signing keys");
        } else {
            tracing::info!(key_count = keys.len(), "JWKS fetched successfully");
        }

        Ok(keys)
    }
}

/// Turn one JWKS entry into a signing key. Encryption keys, keys without a
/// kid, and key types we cannot verify with are skipped.
fn parse_signing_key(value: serde_json::Value) -> Option<(String, SigningKey)> {
    let kid = value.get("kid").and_then(|v| v.as_str())?.to_string();

    if value.get("use").and_then(|v| v.as_str()) == Some("enc") {
        tracing::debug!(kid = %kid, "Skipping encryption key");
        return None;
    }

    let alg = match value.get("alg").and_then(|v| v.as_str()) {
        Some(name) => match Algorithm::from_str(name) {
            Ok(alg) => Some(alg),
            Err(_) => {
                tracing::debug!(kid = %kid, alg = %name, "Skipping key with unsupported algorithm");
                return None;
            }
        },
        None => None,
    };

    let jwk: Jwk = match serde_json::from_value(value) {
        Ok(jwk) => jwk,
        Err(e) => {
            tracing::warn!(kid = %kid, error = %e, "Skipping unparseable JWK");
            return None;
        }
    };

    match DecodingKey::from_jwk(&jwk) {
        Ok(key) => Some((kid, SigningKey { key, alg })),
        Err(e) => {
            tracing::warn!(kid = %kid, error = %e, "Skipping JWK that is not a usable public key");
            None
        }
    }
}

fn classify(kind: &ErrorKind) -> VerificationError {
    match kind {
        ErrorKind::ExpiredSignature => VerificationError::Expired,
        ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => VerificationError::BadSignature,
        ErrorKind::InvalidIssuer => VerificationError::IssuerMismatch,
        ErrorKind::InvalidAudience => VerificationError::AudienceMismatch,
        ErrorKind::MissingRequiredClaim(claim) => {
            VerificationError::Malformed(format!("missing claim {}", claim))
        }
        ErrorKind::ImmatureSignature => VerificationError::Malformed("token not yet valid".to_string()),
        other => VerificationError::Malformed(format!("{:?}", other)),
    }
}
