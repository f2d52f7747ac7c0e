//! In-memory [`EntityStore`] backend — the default local/dev and test
//! double for the spec's strongly-consistent cloud KV store.

use crate::entity::{normalize_limit, Entity, EntityStore, Indexed, StateMachineEntity};
use crate::errors::StoreError;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

/// A `parking_lot::RwLock<HashMap<id, T>>`-backed store with secondary
/// indexes recomputed from `Indexed::index_keys` on every write. Reads
/// take the shared lock; writes (`create`/`update`) take the exclusive
/// lock for the whole conditional-check-then-write so two concurrent
/// writers can never both succeed against the same `updated_at`.
pub struct InMemoryStore<T> {
    items: RwLock<HashMap<String, T>>,
}

impl<T> Default for InMemoryStore<T> {
    fn default() -> Self {
        Self {
            items: RwLock::new(HashMap::new()),
        }
    }
}

impl<T> InMemoryStore<T> {
    /// Build an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl<T> EntityStore<T> for InMemoryStore<T>
where
    T: Indexed + StateMachineEntity,
{
    async fn create(&self, entity: T) -> crate::Result<()> {
        let mut items = self.items.write();
        if items.contains_key(entity.id()) {
            return Err(StoreError::AlreadyExists {
                id: entity.id().to_string(),
            });
        }
        items.insert(entity.id().to_string(), entity);
        Ok(())
    }

    async fn get(&self, id: &str) -> crate::Result<T> {
        self.items
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound { id: id.to_string() })
    }

    async fn update(&self, expected_updated_at: chrono::DateTime<chrono::Utc>, new: T) -> crate::Result<()> {
        let mut items = self.items.write();
        let current = items
            .get(new.id())
            .ok_or_else(|| StoreError::NotFound { id: new.id().to_string() })?;

        if current.updated_at() != expected_updated_at {
            return Err(StoreError::ConcurrentModification {
                id: new.id().to_string(),
            });
        }
        if !current.can_transition_to(&new) {
            return Err(StoreError::InvalidStateTransition {
                id: new.id().to_string(),
                message: "entity's state machine rejects this transition".to_string(),
            });
        }

        items.insert(new.id().to_string(), new);
        Ok(())
    }

    async fn list_by(&self, index_name: &str, value: &str, limit: usize) -> crate::Result<Vec<T>> {
        let limit = normalize_limit(limit);
        let items = self.items.read();
        let mut matches: Vec<&T> = items
            .values()
            .filter(|item| {
                item.index_keys()
                    .iter()
                    .any(|(name, val)| *name == index_name && val == value)
            })
            .collect();
        matches.sort_by(|a, b| b.updated_at().cmp(&a.updated_at()));
        Ok(matches.into_iter().take(limit).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};

    #[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
    struct Widget {
        id: String,
        status: String,
        updated_at: DateTime<Utc>,
    }

    impl Entity for Widget {
        fn id(&self) -> &str {
            &self.id
        }
        fn updated_at(&self) -> DateTime<Utc> {
            self.updated_at
        }
    }

    impl Indexed for Widget {
        fn index_keys(&self) -> Vec<(&'static str, String)> {
            vec![("status", self.status.clone())]
        }
    }

    impl StateMachineEntity for Widget {
        fn can_transition_to(&self, next: &Self) -> bool {
            !(self.status == "terminal" && next.status != "terminal")
        }
    }

    fn widget(id: &str, status: &str, ts: &str) -> Widget {
        Widget {
            id: id.to_string(),
            status: status.to_string(),
            updated_at: ts.parse().unwrap(),
        }
    }

    #[tokio::test]
    async fn create_rejects_duplicate_id() {
        let store = InMemoryStore::new();
        store.create(widget("a", "pending", "2026-01-01T00:00:00Z")).await.unwrap();
        let err = store
            .create(widget("a", "pending", "2026-01-01T00:00:01Z"))
            .await
            .unwrap_err();
        assert_eq!(err.category(), "already_exists");
    }

    #[tokio::test]
    async fn update_with_stale_expected_timestamp_is_concurrent_modification() {
        let store = InMemoryStore::new();
        store.create(widget("a", "pending", "2026-01-01T00:00:00Z")).await.unwrap();
        let stale: DateTime<Utc> = "2020-01-01T00:00:00Z".parse().unwrap();
        let err = store
            .update(stale, widget("a", "approved", "2026-01-01T00:00:01Z"))
            .await
            .unwrap_err();
        assert!(err.is_concurrent_modification());
    }

    #[tokio::test]
    async fn update_rejects_transition_out_of_terminal_state() {
        let store = InMemoryStore::new();
        let created_at: DateTime<Utc> = "2026-01-01T00:00:00Z".parse().unwrap();
        store.create(widget("a", "terminal", "2026-01-01T00:00:00Z")).await.unwrap();
        let err = store
            .update(created_at, widget("a", "pending", "2026-01-01T00:00:01Z"))
            .await
            .unwrap_err();
        assert_eq!(err.category(), "invalid_state_transition");
    }

    #[tokio::test]
    async fn list_by_returns_newest_first() {
        let store = InMemoryStore::new();
        store.create(widget("a", "pending", "2026-01-01T00:00:00Z")).await.unwrap();
        store.create(widget("b", "pending", "2026-01-02T00:00:00Z")).await.unwrap();
        let results = store.list_by("status", "pending", 10).await.unwrap();
        assert_eq!(results.iter().map(|w| w.id.as_str()).collect::<Vec<_>>(), vec!["b", "a"]);
    }
}
