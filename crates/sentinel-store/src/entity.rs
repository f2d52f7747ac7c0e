//! The persistent entity store abstraction (C3).
//!
//! A single trait (`EntityStore<T>`) is implemented once per backend
//! ([`crate::InMemoryStore`], [`crate::RedbStore`]) and reused for every
//! stored entity kind (approval requests, break-glass events, server
//! sessions) by having each entity implement three small bounds:
//!
//! - [`Entity`]: an id and an `updated_at` the optimistic-locking
//!   invariant is checked against.
//! - [`Indexed`]: the secondary-index key/value pairs a `list_by` query
//!   can filter on (the spec's GSIs — requester/invoker/user, status,
//!   profile, server-instance).
//! - [`StateMachineEntity`]: whether a proposed new value is a legal
//!   transition from the currently-stored value, enforced by the store
//!   layer independently of any in-memory guard the workflow already
//!   applied (Design Notes §9: "enforce transitions in two places").

use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Default `list_by` page size when the caller doesn't specify one.
pub const DEFAULT_LIST_LIMIT: usize = 100;

/// Maximum `list_by` page size a store will ever return in one call.
pub const MAX_LIST_LIMIT: usize = 1000;

/// An entity that can be stored: has a stable id and an `updated_at`
/// timestamp the store's optimistic-locking `update` checks against.
pub trait Entity: Clone + Send + Sync + serde::Serialize + serde::de::DeserializeOwned + 'static {
    /// The entity's unique id (partition key).
    fn id(&self) -> &str;

    /// The timestamp an optimistic `update` is conditioned on.
    fn updated_at(&self) -> DateTime<Utc>;
}

/// Secondary-index key/value pairs an entity is queryable by. Each pair
/// is `(index_name, value)`, e.g. `("requester", "alice")`.
pub trait Indexed: Entity {
    /// The index entries this value should currently be discoverable
    /// under.
    fn index_keys(&self) -> Vec<(&'static str, String)>;
}

/// An entity whose stored value may only move through certain
/// transitions (e.g. `pending -> approved`, never out of a terminal
/// state). The store layer calls this on every `update` so a stale
/// client can't smuggle an illegal transition past a race.
pub trait StateMachineEntity: Entity {
    /// Whether moving from `self` (the currently-stored value) to `next`
    /// (the proposed new value) is a legal transition.
    fn can_transition_to(&self, next: &Self) -> bool;
}

/// Clamp a caller-supplied list limit into `(0, MAX_LIST_LIMIT]`,
/// defaulting to [`DEFAULT_LIST_LIMIT`] when zero.
pub fn normalize_limit(limit: usize) -> usize {
    if limit == 0 {
        DEFAULT_LIST_LIMIT
    } else {
        limit.min(MAX_LIST_LIMIT)
    }
}

/// The persistent store abstraction every entity kind is served through.
///
/// Implementations provide strongly-consistent single-item operations:
/// `create` is conditional-not-exists, `update` is conditional on the
/// caller's previously-read `updated_at` and is additionally guarded by
/// [`StateMachineEntity::can_transition_to`], and `list_by` queries a
/// named secondary index, returning newest-first.
#[async_trait]
pub trait EntityStore<T>: Send + Sync
where
    T: Indexed + StateMachineEntity,
{
    /// Insert a new entity. Fails with `AlreadyExists` if `entity.id()`
    /// is already present.
    async fn create(&self, entity: T) -> crate::Result<()>;

    /// Fetch an entity by id. Fails with `NotFound` if absent.
    async fn get(&self, id: &str) -> crate::Result<T>;

    /// Conditionally replace the stored entity with `new`, first
    /// verifying the entity currently stored under `new.id()` has
    /// `updated_at == expected_updated_at` (optimistic locking) and that
    /// the transition from the currently-stored value to `new` is legal
    /// per [`StateMachineEntity::can_transition_to`].
    async fn update(&self, expected_updated_at: DateTime<Utc>, new: T) -> crate::Result<()>;

    /// List entities matching `index_name == value`, newest-first by
    /// `updated_at`, capped at `normalize_limit(limit)` results.
    async fn list_by(&self, index_name: &str, value: &str, limit: usize) -> crate::Result<Vec<T>>;
}
