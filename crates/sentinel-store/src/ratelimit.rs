//! Rate limiter (C13): token-bucket-like fixed-window counters keyed by
//! caller ARN. Two implementations share the same fixed-window algorithm
//! and the same [`RateLimiter`] contract:
//!
//! - [`InMemoryRateLimiter`]: per-process counters behind a `Mutex`, for
//!   a single local/dev instance.
//! - [`StoreRateLimiter`]: the same algorithm over an [`EntityStore`],
//!   for multi-instance deployments that need a shared counter.
//!
//! Per the spec (and the "Rate-limit semantics on window boundary" open
//! question, resolved in `DESIGN.md`): windows are **fixed**, not
//! sliding — a key truncates to `window_start` and its count resets the
//! instant the next window begins, rather than decaying continuously.
//! Backend errors fail open (logged); being genuinely over-limit never
//! fails open.

use crate::entity::{Entity, EntityStore, Indexed, StateMachineEntity};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;

/// Outcome of a single [`RateLimiter::allow`] check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allowance {
    /// Whether this call may proceed.
    pub allowed: bool,
    /// Remaining calls permitted in the current window (0 if denied).
    pub remaining: u32,
    /// How long the caller should wait before retrying, if denied.
    pub retry_after: Option<Duration>,
}

/// A fixed-window rate limiter keyed by an arbitrary string (typically a
/// caller ARN).
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Check and record one call against `key`'s current window.
    async fn allow(&self, key: &str) -> Allowance;
}

/// Fixed-window counter entry persisted by [`StoreRateLimiter`]. Mirrors
/// the `ratelimit` table in `spec.md` §6 (`RL#<ARN>` partition key, TTL
/// attribute).
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RateLimitEntry {
    /// `RL#<key>`.
    pub id: String,
    /// Unix-epoch second the current window started at.
    pub window_start: i64,
    /// Calls recorded so far in this window.
    pub count: u32,
    pub updated_at: DateTime<Utc>,
}

impl Entity for RateLimitEntry {
    fn id(&self) -> &str {
        &self.id
    }
    fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

impl Indexed for RateLimitEntry {
    fn index_keys(&self) -> Vec<(&'static str, String)> {
        Vec::new()
    }
}

impl StateMachineEntity for RateLimitEntry {
    fn can_transition_to(&self, _next: &Self) -> bool {
        // Counters have no terminal state; any value may be replaced.
        true
    }
}

fn window_start(now: DateTime<Utc>, window: Duration) -> i64 {
    let window_secs = window.as_secs().max(1) as i64;
    (now.timestamp() / window_secs) * window_secs
}

fn retry_after(now: DateTime<Utc>, current_window_start: i64, window: Duration) -> Duration {
    let window_secs = window.as_secs().max(1) as i64;
    let window_end = current_window_start + window_secs;
    let remaining_secs = (window_end - now.timestamp()).max(0);
    Duration::from_secs(remaining_secs as u64)
}

/// Per-process fixed-window rate limiter behind a single mutex.
pub struct InMemoryRateLimiter {
    cap: u32,
    window: Duration,
    counters: Mutex<HashMap<String, (i64, u32)>>,
}

impl InMemoryRateLimiter {
    /// Allow up to `cap` calls per `window` per key.
    pub fn new(cap: u32, window: Duration) -> Self {
        Self {
            cap,
            window,
            counters: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl RateLimiter for InMemoryRateLimiter {
    async fn allow(&self, key: &str) -> Allowance {
        let now = Utc::now();
        let current_window = window_start(now, self.window);
        let mut counters = self.counters.lock();
        let entry = counters.entry(key.to_string()).or_insert((current_window, 0));

        if entry.0 != current_window {
            *entry = (current_window, 0);
        }

        if entry.1 >= self.cap {
            return Allowance {
                allowed: false,
                remaining: 0,
                retry_after: Some(retry_after(now, current_window, self.window)),
            };
        }

        entry.1 += 1;
        Allowance {
            allowed: true,
            remaining: self.cap - entry.1,
            retry_after: None,
        }
    }
}

/// Shared fixed-window rate limiter over an [`EntityStore`], for
/// multi-instance deployments. Fails open (logs a warning, allows the
/// call) on any backend error — availability beats strict rate limiting
/// when the store itself is the thing that's broken.
pub struct StoreRateLimiter<S> {
    store: S,
    cap: u32,
    window: Duration,
}

impl<S> StoreRateLimiter<S>
where
    S: EntityStore<RateLimitEntry>,
{
    /// Allow up to `cap` calls per `window` per key, backed by `store`.
    pub fn new(store: S, cap: u32, window: Duration) -> Self {
        Self { store, cap, window }
    }

    fn entry_id(key: &str) -> String {
        format!("RL#{key}")
    }

    async fn allow_inner(&self, key: &str) -> crate::Result<Allowance> {
        let now = Utc::now();
        let current_window = window_start(now, self.window);
        let id = Self::entry_id(key);

        match self.store.get(&id).await {
            Ok(existing) if existing.window_start == current_window => {
                if existing.count >= self.cap {
                    return Ok(Allowance {
                        allowed: false,
                        remaining: 0,
                        retry_after: Some(retry_after(now, current_window, self.window)),
                    });
                }
                let updated = RateLimitEntry {
                    count: existing.count + 1,
                    updated_at: now,
                    ..existing.clone()
                };
                match self.store.update(existing.updated_at, updated.clone()).await {
                    Ok(()) => Ok(Allowance {
                        allowed: true,
                        remaining: self.cap - updated.count,
                        retry_after: None,
                    }),
                    Err(err) if err.is_concurrent_modification() => {
                        // Lost the race to another instance; treat as
                        // allowed-with-zero-remaining rather than
                        // retrying, matching fail-open-on-contention.
                        Ok(Allowance {
                            allowed: true,
                            remaining: 0,
                            retry_after: None,
                        })
                    }
                    Err(err) => Err(err),
                }
            }
            Ok(existing) => {
                // Window rolled over: reset to 1.
                let reset = RateLimitEntry {
                    window_start: current_window,
                    count: 1,
                    updated_at: now,
                    ..existing.clone()
                };
                self.store.update(existing.updated_at, reset).await?;
                Ok(Allowance {
                    allowed: true,
                    remaining: self.cap.saturating_sub(1),
                    retry_after: None,
                })
            }
            Err(err) if err.is_not_found() => {
                let fresh = RateLimitEntry {
                    id: id.clone(),
                    window_start: current_window,
                    count: 1,
                    updated_at: now,
                };
                match self.store.create(fresh).await {
                    Ok(()) | Err(crate::StoreError::AlreadyExists { .. }) => Ok(Allowance {
                        allowed: true,
                        remaining: self.cap.saturating_sub(1),
                        retry_after: None,
                    }),
                    Err(err) => Err(err),
                }
            }
            Err(err) => Err(err),
        }
    }
}

#[async_trait]
impl<S> RateLimiter for StoreRateLimiter<S>
where
    S: EntityStore<RateLimitEntry>,
{
    async fn allow(&self, key: &str) -> Allowance {
        match self.allow_inner(key).await {
            Ok(allowance) => allowance,
            Err(err) => {
                tracing::warn!(%key, %err, "rate limit store unavailable; failing open");
                Allowance {
                    allowed: true,
                    remaining: self.cap,
                    retry_after: None,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InMemoryStore;

    #[tokio::test]
    async fn allows_up_to_cap_then_denies() {
        let limiter = InMemoryRateLimiter::new(3, Duration::from_secs(60));
        assert!(limiter.allow("caller-a").await.allowed);
        assert!(limiter.allow("caller-a").await.allowed);
        assert!(limiter.allow("caller-a").await.allowed);
        let fourth = limiter.allow("caller-a").await;
        assert!(!fourth.allowed);
        assert!(fourth.retry_after.is_some());
    }

    #[tokio::test]
    async fn keys_are_independent() {
        let limiter = InMemoryRateLimiter::new(1, Duration::from_secs(60));
        assert!(limiter.allow("caller-a").await.allowed);
        assert!(limiter.allow("caller-b").await.allowed);
    }

    #[tokio::test]
    async fn store_rate_limiter_tracks_cap_across_calls() {
        let store = InMemoryStore::<RateLimitEntry>::new();
        let limiter = StoreRateLimiter::new(store, 2, Duration::from_secs(60));
        assert!(limiter.allow("caller-a").await.allowed);
        assert!(limiter.allow("caller-a").await.allowed);
        assert!(!limiter.allow("caller-a").await.allowed);
    }
}
