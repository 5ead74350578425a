//! Authorization server key set cache.
//!
//! Fetches the JWKS document lazily, keeps it for a TTL and refreshes it on
//! expiry or when a token names an unknown `kid`. Concurrent callers that
//! need a refresh share a single in-flight fetch.
//!
//! Only the most recent fetch is trusted: a key that disappears from the
//! published set stops verifying tokens immediately.
//!
//! ```rust,ignore
//! use rmcp_oauth::auth::jwks::{HttpKeySource, KeySetCache};
//!
//! let keys = KeySetCache::new(HttpKeySource::new("https://auth.example.com/keys")?)
//!     .ttl(Duration::from_secs(300));
//! let key = keys.get_key("key-1").await?;
//! ```

use crate::auth::error::{KeyFetchError, KeyLookupError};
use futures::future::{BoxFuture, FutureExt, Shared};
use jsonwebtoken::jwk::{
    AlgorithmParameters, EllipticCurve, Jwk, JwkSet, KeyAlgorithm, PublicKeyUse,
};
use jsonwebtoken::{Algorithm, DecodingKey};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Default lifetime of a fetched key set.
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// Minimum age of a key set before an unknown `kid` may trigger a refresh.
pub const DEFAULT_MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(10);

/// Upper bound on a single key set fetch.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// Where key sets come from.
///
/// [`HttpKeySource`] is the production implementation; tests plug in their
/// own to count or fail fetches.
pub trait KeySource: Send + Sync + 'static {
    fn fetch(&self) -> BoxFuture<'_, Result<JwkSet, KeyFetchError>>;
}

/// Fetches a JWKS document over HTTP.
#[derive(Clone, Debug)]
pub struct HttpKeySource {
    client: reqwest::Client,
    url: String,
}

impl HttpKeySource {
    pub fn new(url: impl Into<String>) -> Result<Self, KeyFetchError> {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_FETCH_TIMEOUT)
            .build()
            .map_err(|e| KeyFetchError::Request(e.to_string()))?;
        Ok(Self::with_client(client, url))
    }

    pub fn with_client(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl KeySource for HttpKeySource {
    fn fetch(&self) -> BoxFuture<'_, Result<JwkSet, KeyFetchError>> {
        async move {
            let resp = self.client.get(&self.url).send().await.map_err(|e| {
                if e.is_timeout() {
                    KeyFetchError::Timeout
                } else {
                    KeyFetchError::Request(e.to_string())
                }
            })?;
            if !resp.status().is_success() {
                return Err(KeyFetchError::Status(resp.status().as_u16()));
            }
            resp.json::<JwkSet>()
                .await
                .map_err(|e| KeyFetchError::Decode(e.to_string()))
        }
        .boxed()
    }
}

/// A verification key resolved from the key set.
#[derive(Clone)]
pub struct ResolvedKey {
    pub kid: String,
    /// The only algorithm tokens signed with this key may declare.
    pub algorithm: Algorithm,
    pub key: DecodingKey,
}

impl std::fmt::Debug for ResolvedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedKey")
            .field("kid", &self.kid)
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

/// One fetched key set.
#[derive(Debug)]
pub struct KeySet {
    keys: HashMap<String, ResolvedKey>,
    fetched_at: Instant,
}

impl KeySet {
    fn from_jwks(jwks: JwkSet) -> Self {
        let keys = jwks
            .keys
            .iter()
            .filter_map(resolve_jwk)
            .map(|key| (key.kid.clone(), key))
            .collect();
        Self {
            keys,
            fetched_at: Instant::now(),
        }
    }

    pub fn get(&self, kid: &str) -> Option<&ResolvedKey> {
        self.keys.get(kid)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn age(&self) -> Duration {
        self.fetched_at.elapsed()
    }
}

type SharedFetch = Shared<BoxFuture<'static, Result<Arc<KeySet>, KeyFetchError>>>;

#[derive(Default)]
struct CacheState {
    current: Option<Arc<KeySet>>,
    in_flight: Option<(u64, SharedFetch)>,
    next_fetch_id: u64,
}

struct Inner {
    source: Box<dyn KeySource>,
    state: Mutex<CacheState>,
    ttl: Duration,
    min_refresh_interval: Duration,
    fetch_timeout: Duration,
}

/// Process-wide, lazily populated cache of the authorization server's
/// signing keys. Cheap to clone.
#[derive(Clone)]
pub struct KeySetCache {
    inner: Arc<Inner>,
}

impl KeySetCache {
    pub fn new(source: impl KeySource) -> Self {
        Self {
            inner: Arc::new(Inner {
                source: Box::new(source),
                state: Mutex::new(CacheState::default()),
                ttl: DEFAULT_TTL,
                min_refresh_interval: DEFAULT_MIN_REFRESH_INTERVAL,
                fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            }),
        }
    }

    /// How long a fetched key set is considered fresh.
    ///
    /// Like the other builder methods, this must be called before the cache
    /// is cloned.
    pub fn ttl(self, ttl: Duration) -> Self {
        self.configure(|inner| inner.ttl = ttl)
    }

    /// How old a fresh key set must be before an unknown `kid` refetches it.
    pub fn min_refresh_interval(self, interval: Duration) -> Self {
        self.configure(|inner| inner.min_refresh_interval = interval)
    }

    /// Upper bound on a single fetch, on top of any client-level timeout.
    pub fn fetch_timeout(self, timeout: Duration) -> Self {
        self.configure(|inner| inner.fetch_timeout = timeout)
    }

    // Builder methods only apply before the cache is cloned; afterwards the
    // settings are shared and the call is ignored.
    fn configure(mut self, f: impl FnOnce(&mut Inner)) -> Self {
        match Arc::get_mut(&mut self.inner) {
            Some(inner) => f(inner),
            None => tracing::warn!("key set cache already shared, ignoring configuration change"),
        }
        self
    }

    /// Resolve the verification key for `kid`, fetching the key set when it
    /// is missing, stale, or does not contain `kid`.
    pub async fn get_key(&self, kid: &str) -> Result<ResolvedKey, KeyLookupError> {
        let current = self.inner.state.lock().await.current.clone();

        if let Some(set) = &current {
            let age = set.age();
            if age < self.inner.ttl {
                if let Some(key) = set.get(kid) {
                    return Ok(key.clone());
                }
                if age < self.inner.min_refresh_interval {
                    tracing::debug!(kid, "kid not in recently fetched key set");
                    return Err(KeyLookupError::NotFound { kid: kid.into() });
                }
                tracing::debug!(kid, "kid not in key set, refreshing");
            }
        }

        let set = self.refresh_from(current).await?;
        set.get(kid)
            .cloned()
            .ok_or_else(|| KeyLookupError::NotFound { kid: kid.into() })
    }

    /// Fetch the key set now, joining a fetch already in flight if there
    /// is one.
    pub async fn refresh(&self) -> Result<Arc<KeySet>, KeyFetchError> {
        let current = self.inner.state.lock().await.current.clone();
        self.refresh_from(current).await
    }

    /// Replace `seen`, the key set the caller found lacking.
    ///
    /// Joins the fetch in flight, or reuses a set that landed after `seen`
    /// was read, so every caller that arrived before a fetch completed is
    /// served by it.
    async fn refresh_from(&self, seen: Option<Arc<KeySet>>) -> Result<Arc<KeySet>, KeyFetchError> {
        let fetch = {
            let mut state = self.inner.state.lock().await;
            if let Some((_, fetch)) = &state.in_flight {
                fetch.clone()
            } else {
                if let Some(current) = &state.current {
                    let landed = seen.as_ref().is_none_or(|seen| !Arc::ptr_eq(seen, current));
                    if landed {
                        return Ok(current.clone());
                    }
                }
                let id = state.next_fetch_id;
                state.next_fetch_id += 1;
                let fetch = Self::fetch(self.inner.clone(), id).boxed().shared();
                state.in_flight = Some((id, fetch.clone()));
                fetch
            }
        };
        fetch.await
    }

    /// Prefetch the key set. Failures are logged and left for the first
    /// verification to retry.
    pub async fn warm(&self) {
        if let Err(e) = self.refresh().await {
            tracing::warn!(error = %e, "failed to prefetch key set");
        }
    }

    async fn fetch(inner: Arc<Inner>, id: u64) -> Result<Arc<KeySet>, KeyFetchError> {
        let result = match tokio::time::timeout(inner.fetch_timeout, inner.source.fetch()).await {
            Ok(result) => result.map(|jwks| Arc::new(KeySet::from_jwks(jwks))),
            Err(_) => Err(KeyFetchError::Timeout),
        };

        let mut state = inner.state.lock().await;
        if matches!(state.in_flight, Some((current, _)) if current == id) {
            state.in_flight = None;
        }
        match &result {
            Ok(set) => {
                tracing::info!(keys = set.len(), "key set refreshed");
                state.current = Some(set.clone());
            }
            Err(e) => tracing::error!(error = %e, "key set fetch failed"),
        }
        result
    }
}

fn resolve_jwk(jwk: &Jwk) -> Option<ResolvedKey> {
    let kid = jwk.common.key_id.clone()?;
    if matches!(jwk.common.public_key_use, Some(PublicKeyUse::Encryption)) {
        tracing::debug!(kid, "skipping encryption key");
        return None;
    }
    if matches!(jwk.algorithm, AlgorithmParameters::OctetKey(_)) {
        tracing::debug!(kid, "skipping symmetric key");
        return None;
    }

    let algorithm = match &jwk.common.key_algorithm {
        Some(alg) => signing_algorithm(alg),
        None => default_algorithm(&jwk.algorithm),
    };
    let Some(algorithm) = algorithm else {
        tracing::debug!(kid, "skipping key with unsupported algorithm");
        return None;
    };

    match DecodingKey::from_jwk(jwk) {
        Ok(key) => Some(ResolvedKey {
            kid,
            algorithm,
            key,
        }),
        Err(e) => {
            tracing::debug!(kid, error = %e, "skipping unusable key");
            None
        }
    }
}

fn signing_algorithm(alg: &KeyAlgorithm) -> Option<Algorithm> {
    Some(match alg {
        KeyAlgorithm::RS256 => Algorithm::RS256,
        KeyAlgorithm::RS384 => Algorithm::RS384,
        KeyAlgorithm::RS512 => Algorithm::RS512,
        KeyAlgorithm::PS256 => Algorithm::PS256,
        KeyAlgorithm::PS384 => Algorithm::PS384,
        KeyAlgorithm::PS512 => Algorithm::PS512,
        KeyAlgorithm::ES256 => Algorithm::ES256,
        KeyAlgorithm::ES384 => Algorithm::ES384,
        KeyAlgorithm::EdDSA => Algorithm::EdDSA,
        _ => return None,
    })
}

fn default_algorithm(params: &AlgorithmParameters) -> Option<Algorithm> {
    match params {
        AlgorithmParameters::RSA(_) => Some(Algorithm::RS256),
        AlgorithmParameters::EllipticCurve(ec) => match ec.curve {
            EllipticCurve::P256 => Some(Algorithm::ES256),
            EllipticCurve::P384 => Some(Algorithm::ES384),
            _ => None,
        },
        AlgorithmParameters::OctetKeyPair(_) => Some(Algorithm::EdDSA),
        _ => None,
    }
}
