//! Embedded single-node persistent [`EntityStore`] backend over `redb`
//! (grounded in the teacher's `aura-agent::storage_adapter::ProductionStorage`
//! use of `redb`). Stands in for the spec's strongly-consistent cloud KV
//! store in a self-hosted deployment; `sentinel-cli` and `sentinel-server`
//! default to this outside of tests.
//!
//! Each entity kind gets its own `redb::Database` file with a single
//! table holding JSON-encoded values keyed by entity id. Secondary
//! indexes are not native to `redb`, so `list_by` performs a full-table
//! scan and filters in memory — acceptable at the scale a self-hosted
//! deployment of Sentinel operates at (hundreds to low thousands of
//! live requests/sessions), and noted as a simplification in DESIGN.md.
//! Conditional writes are correct because `redb` serializes all writers
//! through a single write-transaction lock: the read-then-decide-then-
//! write sequence inside one `WriteTransaction` is atomic with respect to
//! every other writer.

use crate::entity::{normalize_limit, Entity, EntityStore, Indexed, StateMachineEntity};
use crate::errors::StoreError;
use async_trait::async_trait;
use redb::{Database, ReadableTable, TableDefinition};
use std::marker::PhantomData;
use std::path::Path;
use std::sync::Mutex;

const ENTITIES: TableDefinition<&str, &[u8]> = TableDefinition::new("entities");

/// A `redb`-backed [`EntityStore`] for entity kind `T`.
pub struct RedbStore<T> {
    database: Mutex<Database>,
    _marker: PhantomData<T>,
}

impl<T> RedbStore<T>
where
    T: Indexed + StateMachineEntity,
{
    /// Open (or create) a `redb` database file at `path`, ensuring the
    /// entities table exists.
    pub fn open(path: impl AsRef<Path>) -> crate::Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|err| StoreError::BackendUnavailable {
                message: format!("create storage directory: {err}"),
            })?;
        }
        let database = Database::create(path).map_err(|err| StoreError::BackendUnavailable {
            message: format!("open redb database at {path:?}: {err}"),
        })?;
        {
            let txn = database.begin_write().map_err(backend_err)?;
            txn.open_table(ENTITIES).map_err(backend_err)?;
            txn.commit().map_err(backend_err)?;
        }
        Ok(Self {
            database: Mutex::new(database),
            _marker: PhantomData,
        })
    }

    fn encode(entity: &T) -> crate::Result<Vec<u8>> {
        serde_json::to_vec(entity).map_err(|err| StoreError::InvalidQuery {
            message: format!("serialize entity: {err}"),
        })
    }

    fn decode(bytes: &[u8]) -> crate::Result<T> {
        serde_json::from_slice(bytes).map_err(|err| StoreError::BackendUnavailable {
            message: format!("corrupt entity record: {err}"),
        })
    }
}

fn backend_err(err: impl std::fmt::Display) -> StoreError {
    StoreError::BackendUnavailable {
        message: err.to_string(),
    }
}

#[async_trait]
impl<T> EntityStore<T> for RedbStore<T>
where
    T: Indexed + StateMachineEntity,
{
    async fn create(&self, entity: T) -> crate::Result<()> {
        let bytes = Self::encode(&entity)?;
        let database = self.database.lock().expect("redb mutex poisoned");
        let txn = database.begin_write().map_err(backend_err)?;
        {
            let mut table = txn.open_table(ENTITIES).map_err(backend_err)?;
            if table.get(entity.id()).map_err(backend_err)?.is_some() {
                return Err(StoreError::AlreadyExists {
                    id: entity.id().to_string(),
                });
            }
            table.insert(entity.id(), bytes.as_slice()).map_err(backend_err)?;
        }
        txn.commit().map_err(backend_err)?;
        Ok(())
    }

    async fn get(&self, id: &str) -> crate::Result<T> {
        let database = self.database.lock().expect("redb mutex poisoned");
        let txn = database.begin_read().map_err(backend_err)?;
        let table = txn.open_table(ENTITIES).map_err(backend_err)?;
        let bytes = table
            .get(id)
            .map_err(backend_err)?
            .ok_or_else(|| StoreError::NotFound { id: id.to_string() })?;
        Self::decode(bytes.value())
    }

    async fn update(&self, expected_updated_at: chrono::DateTime<chrono::Utc>, new: T) -> crate::Result<()> {
        let bytes = Self::encode(&new)?;
        let database = self.database.lock().expect("redb mutex poisoned");
        let txn = database.begin_write().map_err(backend_err)?;
        {
            let mut table = txn.open_table(ENTITIES).map_err(backend_err)?;
            let current_bytes = table
                .get(new.id())
                .map_err(backend_err)?
                .ok_or_else(|| StoreError::NotFound { id: new.id().to_string() })?
                .value()
                .to_vec();
            let current = Self::decode(&current_bytes)?;

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
            table.insert(new.id(), bytes.as_slice()).map_err(backend_err)?;
        }
        txn.commit().map_err(backend_err)?;
        Ok(())
    }

    async fn list_by(&self, index_name: &str, value: &str, limit: usize) -> crate::Result<Vec<T>> {
        let limit = normalize_limit(limit);
        let database = self.database.lock().expect("redb mutex poisoned");
        let txn = database.begin_read().map_err(backend_err)?;
        let table = txn.open_table(ENTITIES).map_err(backend_err)?;

        let mut matches = Vec::new();
        for row in table.iter().map_err(backend_err)? {
            let (_, value_bytes) = row.map_err(backend_err)?;
            let entity = Self::decode(value_bytes.value())?;
            if entity
                .index_keys()
                .iter()
                .any(|(name, val)| *name == index_name && val == value)
            {
                matches.push(entity);
            }
        }
        matches.sort_by(|a, b| b.updated_at().cmp(&a.updated_at()));
        matches.truncate(limit);
        Ok(matches)
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
        fn can_transition_to(&self, _next: &Self) -> bool {
            true
        }
    }

    fn widget(id: &str, ts: &str) -> Widget {
        Widget {
            id: id.to_string(),
            status: "pending".to_string(),
            updated_at: ts.parse().unwrap(),
        }
    }

    #[tokio::test]
    async fn create_get_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store: RedbStore<Widget> = RedbStore::open(dir.path().join("widgets.redb")).unwrap();
        store.create(widget("a", "2026-01-01T00:00:00Z")).await.unwrap();
        let fetched = store.get("a").await.unwrap();
        assert_eq!(fetched.id, "a");
    }

    #[tokio::test]
    async fn update_rejects_stale_optimistic_lock() {
        let dir = tempfile::tempdir().unwrap();
        let store: RedbStore<Widget> = RedbStore::open(dir.path().join("widgets.redb")).unwrap();
        store.create(widget("a", "2026-01-01T00:00:00Z")).await.unwrap();
        let stale: DateTime<Utc> = "2020-01-01T00:00:00Z".parse().unwrap();
        let err = store.update(stale, widget("a", "2026-01-01T00:00:01Z")).await.unwrap_err();
        assert!(err.is_concurrent_modification());
    }
}
