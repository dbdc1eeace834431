//! Trusted verification keys for bearer tokens.
//!
//! The identity verifier never fetches keys itself. It asks a [`KeySource`]
//! for the key matching a token's `kid`, which keeps verification a pure
//! function of (token, keys, now) and lets tests inject a fixed key set.
//!
//! - [`StaticKeySet`]: a fixed map, used in tests and shared-secret setups
//! - [`JwksKeySet`]: the identity provider's published JWKS document,
//!   refreshed periodically in the background

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use jsonwebtoken::jwk::{AlgorithmParameters, EllipticCurve, Jwk, JwkSet, KeyAlgorithm};
use jsonwebtoken::{Algorithm, DecodingKey};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::error::KeySetError;

/// Default interval between JWKS refreshes, in seconds.
pub const DEFAULT_JWKS_REFRESH_SECS: u64 = 3600;

/// JWKS document URL for a trusted domain.
pub fn jwks_url(domain: &str) -> String {
    format!("https://{}/.well-known/jwks.json", domain.trim_end_matches('/'))
}

// =============================================================================
// Key Source
// =============================================================================

/// A key that can verify signatures made with one algorithm.
#[derive(Clone)]
pub struct VerifyingKey {
    pub algorithm: Algorithm,
    pub key: DecodingKey,
}

impl VerifyingKey {
    pub fn new(algorithm: Algorithm, key: DecodingKey) -> Self {
        Self { algorithm, key }
    }
}

impl std::fmt::Debug for VerifyingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VerifyingKey")
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

/// Lookup of trusted verification keys by key id.
pub trait KeySource: Send + Sync {
    /// The key registered under `kid`, if any.
    fn key_for_id(&self, kid: &str) -> Option<VerifyingKey>;
}

// =============================================================================
// Static Key Set
// =============================================================================

/// Fixed set of verification keys.
#[derive(Clone, Default)]
pub struct StaticKeySet {
    keys: HashMap<String, VerifyingKey>,
}

impl StaticKeySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a key under `kid`, replacing any previous key with the same id.
    pub fn with_key(mut self, kid: impl Into<String>, key: VerifyingKey) -> Self {
        self.keys.insert(kid.into(), key);
        self
    }

    /// Add an HS256 shared secret under `kid`.
    pub fn with_hmac_secret(self, kid: impl Into<String>, secret: &[u8]) -> Self {
        self.with_key(
            kid,
            VerifyingKey::new(Algorithm::HS256, DecodingKey::from_secret(secret)),
        )
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl KeySource for StaticKeySet {
    fn key_for_id(&self, kid: &str) -> Option<VerifyingKey> {
        self.keys.get(kid).cloned()
    }
}

// =============================================================================
// JWKS Key Set
// =============================================================================

/// Key set published by the identity provider at its well-known JWKS URL.
///
/// Keys are held behind an [`ArcSwap`], so a refresh replaces the whole set
/// at once and concurrent lookups never block.
pub struct JwksKeySet {
    url: String,
    client: reqwest::Client,
    keys: ArcSwap<HashMap<String, VerifyingKey>>,
}

impl JwksKeySet {
    /// Download the key set once.
    ///
    /// # Errors
    ///
    /// Fails if the document cannot be fetched or holds no usable keys.
    pub async fn fetch(url: impl Into<String>) -> Result<Self, KeySetError> {
        let url = url.into();
        let client = reqwest::Client::new();
        let keys = download(&client, &url).await?;

        info!(url = %url, keys = keys.len(), "Loaded identity key set");

        Ok(Self {
            url,
            client,
            keys: ArcSwap::from_pointee(keys),
        })
    }

    /// Download the key set again and swap it in.
    ///
    /// On failure the current keys stay in place.
    pub async fn refresh(&self) -> Result<usize, KeySetError> {
        let keys = download(&self.client, &self.url).await?;
        let count = keys.len();
        self.keys.store(Arc::new(keys));
        Ok(count)
    }

    /// Refresh the key set every `interval` until the task is aborted.
    pub fn spawn_refresh(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately and the keys are fresh
            ticker.tick().await;

            loop {
                ticker.tick().await;
                match self.refresh().await {
                    Ok(count) => debug!(url = %self.url, keys = count, "Refreshed identity key set"),
                    Err(e) => warn!(error = %e, "Key set refresh failed, keeping previous keys"),
                }
            }
        })
    }
}

impl KeySource for JwksKeySet {
    fn key_for_id(&self, kid: &str) -> Option<VerifyingKey> {
        self.keys.load().get(kid).cloned()
    }
}

async fn download(
    client: &reqwest::Client,
    url: &str,
) -> Result<HashMap<String, VerifyingKey>, KeySetError> {
    let fetch_error = |e: reqwest::Error| KeySetError::Fetch {
        url: url.to_string(),
        message: e.to_string(),
    };

    let set: JwkSet = client
        .get(url)
        .send()
        .await
        .map_err(fetch_error)?
        .error_for_status()
        .map_err(fetch_error)?
        .json()
        .await
        .map_err(fetch_error)?;

    let keys = keys_from_set(&set);
    if keys.is_empty() {
        return Err(KeySetError::Empty(url.to_string()));
    }
    Ok(keys)
}

/// Convert a JWKS document into verification keys by `kid`.
///
/// Keys without a `kid`, with an unsupported algorithm, or with malformed
/// parameters are skipped.
pub fn keys_from_set(set: &JwkSet) -> HashMap<String, VerifyingKey> {
    let mut keys = HashMap::new();

    for jwk in &set.keys {
        let Some(kid) = jwk.common.key_id.as_deref() else {
            debug!("Skipping JWK without key id");
            continue;
        };
        let Some(algorithm) = algorithm_for(jwk) else {
            debug!(kid, "Skipping JWK with unsupported algorithm");
            continue;
        };
        match DecodingKey::from_jwk(jwk) {
            Ok(key) => {
                keys.insert(kid.to_string(), VerifyingKey::new(algorithm, key));
            }
            Err(e) => debug!(kid, error = %e, "Skipping malformed JWK"),
        }
    }

    keys
}

/// Signature algorithm for a JWK, from its `alg` or else its key type.
fn algorithm_for(jwk: &Jwk) -> Option<Algorithm> {
    if let Some(alg) = &jwk.common.key_algorithm {
        return match alg {
            KeyAlgorithm::HS256 => Some(Algorithm::HS256),
            KeyAlgorithm::HS384 => Some(Algorithm::HS384),
            KeyAlgorithm::HS512 => Some(Algorithm::HS512),
            KeyAlgorithm::ES256 => Some(Algorithm::ES256),
            KeyAlgorithm::ES384 => Some(Algorithm::ES384),
            KeyAlgorithm::RS256 => Some(Algorithm::RS256),
            KeyAlgorithm::RS384 => Some(Algorithm::RS384),
            KeyAlgorithm::RS512 => Some(Algorithm::RS512),
            KeyAlgorithm::PS256 => Some(Algorithm::PS256),
            KeyAlgorithm::PS384 => Some(Algorithm::PS384),
            KeyAlgorithm::PS512 => Some(Algorithm::PS512),
            KeyAlgorithm::EdDSA => Some(Algorithm::EdDSA),
            _ => None,
        };
    }

    match &jwk.algorithm {
        AlgorithmParameters::RSA(_) => Some(Algorithm::RS256),
        AlgorithmParameters::EllipticCurve(params) => match params.curve {
            EllipticCurve::P256 => Some(Algorithm::ES256),
            EllipticCurve::P384 => Some(Algorithm::ES384),
            _ => None,
        },
        AlgorithmParameters::OctetKeyPair(_) => Some(Algorithm::EdDSA),
        AlgorithmParameters::OctetKey(_) => Some(Algorithm::HS256),
    }
}
