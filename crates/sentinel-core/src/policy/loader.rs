//! Policy loading, caching, and (optional) signature verification.

use crate::errors::{CoreError, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Abstracts over the parameter store the loader pulls policy bytes from.
/// Production implementations live outside this crate (SSM, etc); tests
/// use an in-memory double.
#[async_trait]
pub trait Loader: Send + Sync {
    /// Fetch the raw bytes stored at `path`.
    async fn load(&self, path: &str) -> Result<Vec<u8>>;
}

/// An in-memory [`Loader`] double, useful for tests and local development.
#[derive(Debug, Default)]
pub struct StaticLoader {
    entries: HashMap<String, Vec<u8>>,
}

impl StaticLoader {
    /// Build a loader from a fixed set of `(path, bytes)` entries.
    pub fn new(entries: HashMap<String, Vec<u8>>) -> Self {
        Self { entries }
    }
}

#[async_trait]
impl Loader for StaticLoader {
    async fn load(&self, path: &str) -> Result<Vec<u8>> {
        self.entries
            .get(path)
            .cloned()
            .ok_or_else(|| CoreError::not_found(format!("no policy at path: {path}")))
    }
}

struct CacheEntry {
    bytes: Vec<u8>,
    fetched_at: Instant,
}

/// Wraps an inner [`Loader`] with an in-memory cache keyed by path, with a
/// single-flight refresh on miss (double-checked under the write lock so
/// concurrent misses for the same path only trigger one underlying load).
pub struct CachedLoader<L> {
    inner: L,
    ttl: Duration,
    cache: RwLock<HashMap<String, Arc<CacheEntry>>>,
}

impl<L: Loader> CachedLoader<L> {
    /// Wrap `inner`, caching successful loads for `ttl`.
    pub fn new(inner: L, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            cache: RwLock::new(HashMap::new()),
        }
    }

    fn fresh_entry(&self, path: &str) -> Option<Arc<CacheEntry>> {
        let cache = self.cache.read();
        let entry = cache.get(path)?;
        if entry.fetched_at.elapsed() < self.ttl {
            Some(entry.clone())
        } else {
            None
        }
    }
}

#[async_trait]
impl<L: Loader> Loader for CachedLoader<L> {
    async fn load(&self, path: &str) -> Result<Vec<u8>> {
        if let Some(entry) = self.fresh_entry(path) {
            return Ok(entry.bytes.clone());
        }

        // Miss (or stale). Take the write lock and re-check before
        // refreshing, so a burst of concurrent misses for the same path
        // only performs one underlying load.
        let mut cache = self.cache.write();
        if let Some(entry) = cache.get(path) {
            if entry.fetched_at.elapsed() < self.ttl {
                return Ok(entry.bytes.clone());
            }
        }

        let bytes = self.inner.load(path).await?;
        cache.insert(
            path.to_string(),
            Arc::new(CacheEntry {
                bytes: bytes.clone(),
                fetched_at: Instant::now(),
            }),
        );
        Ok(bytes)
    }
}

/// Verifies a policy's detached signature before returning its bytes.
/// Wraps a policy [`Loader`] and a sidecar-signature [`Loader`] rooted at
/// a parallel path (`/signatures/<profile>` next to `/policies/<profile>`).
pub struct VerifyingLoader<L, S, V> {
    policy_loader: L,
    signature_loader: S,
    verifier: V,
    key_id: String,
    /// If true, a verification failure fails the load closed. If false,
    /// a mismatch is logged as a warning and the bytes are returned
    /// anyway.
    enforce: bool,
    /// SHA-256 of the last payload per path that passed the external
    /// verifier. A cheap pre-check: byte-identical content already
    /// proven authentic skips the remote `Verifier` round trip entirely.
    verified_hashes: RwLock<HashMap<String, [u8; 32]>>,
}

fn sha256(bytes: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher.finalize().into()
}

/// Narrow capability consumed by [`VerifyingLoader`] — an asymmetric-key
/// verification collaborator.
#[async_trait]
pub trait SignatureVerifier: Send + Sync {
    /// Verify `signature` over `bytes` under `key_id`.
    async fn verify(&self, key_id: &str, bytes: &[u8], signature: &[u8]) -> Result<bool>;
}

impl<L, S, V> VerifyingLoader<L, S, V>
where
    L: Loader,
    S: Loader,
    V: SignatureVerifier,
{
    /// Construct a verifying loader. `policy_loader` and `signature_loader`
    /// are queried with the same `path`; the signature loader is expected
    /// to resolve its own parallel path internally (or be pre-scoped to
    /// it by the caller).
    pub fn new(policy_loader: L, signature_loader: S, verifier: V, key_id: impl Into<String>, enforce: bool) -> Self {
        Self {
            policy_loader,
            signature_loader,
            verifier,
            key_id: key_id.into(),
            enforce,
            verified_hashes: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl<L, S, V> Loader for VerifyingLoader<L, S, V>
where
    L: Loader,
    S: Loader,
    V: SignatureVerifier,
{
    async fn load(&self, path: &str) -> Result<Vec<u8>> {
        let bytes = self.policy_loader.load(path).await?;
        let hash = sha256(&bytes);

        // Cheap pre-check: if this exact content already passed the
        // external verifier for this path, skip the round trip.
        if self.verified_hashes.read().get(path) == Some(&hash) {
            return Ok(bytes);
        }

        let signature = self.signature_loader.load(path).await?;

        match self.verifier.verify(&self.key_id, &bytes, &signature).await {
            Ok(true) => {
                self.verified_hashes.write().insert(path.to_string(), hash);
                Ok(bytes)
            }
            Ok(false) => {
                if self.enforce {
                    Err(CoreError::integrity(format!(
                        "signature verification failed for policy at {path}"
                    )))
                } else {
                    tracing::warn!(%path, "policy signature did not verify; enforcement disabled, passing through");
                    Ok(bytes)
                }
            }
            Err(err) => {
                if self.enforce {
                    Err(CoreError::integrity(format!(
                        "signature verification call failed for policy at {path}: {err}"
                    )))
                } else {
                    tracing::warn!(%path, %err, "signature verifier unavailable; enforcement disabled, passing through");
                    Ok(bytes)
                }
            }
        }
    }
}
