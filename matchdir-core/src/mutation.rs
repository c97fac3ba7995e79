//! Record mutations: init, update, delete
//!
//! Update is a read-modify-write guarded by the store's version token: the
//! write only lands if nobody touched the record since it was read. A lost
//! race re-reads and tries again, so a concurrent delete ends in `NotFound`
//! instead of the update resurrecting the record.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{RegistryError, Result};
use crate::query::QueryEngine;
use crate::record::{record_key, MatchRecord};
use crate::storage::{StorageBackend, StorageWrite, WriteCondition};

/// Parameters for registering a match
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitParams {
    pub namespace: String,
    pub owner_id: String,
    pub match_id: String,
    pub max_capacity: u32,
}

/// New occupancy counters for an existing record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateParams {
    pub namespace: String,
    pub owner_id: String,
    pub current_players: u32,
    pub current_clients: u32,
}

/// Applies mutations to the store
#[derive(Clone)]
pub struct MatchWriter {
    storage: Arc<dyn StorageBackend>,
    engine: QueryEngine,
    max_update_retries: u32,
}

impl MatchWriter {
    pub fn new(storage: Arc<dyn StorageBackend>, engine: QueryEngine, max_update_retries: u32) -> Self {
        Self {
            storage,
            engine,
            max_update_retries,
        }
    }

    /// Write a fresh record with zero occupancy, replacing any existing one
    pub async fn init(&self, params: InitParams) -> Result<MatchRecord> {
        let record = MatchRecord::new(
            params.namespace,
            params.owner_id,
            params.match_id,
            params.max_capacity,
        );
        self.storage
            .write(StorageWrite::public(record.key(), record.encode()?), WriteCondition::Any)
            .await?;
        Ok(record)
    }

    /// Overwrite the occupancy counters of a live record.
    ///
    /// Every other field is kept from the stored record.
    pub async fn update(&self, params: UpdateParams) -> Result<MatchRecord> {
        let key = record_key(&params.namespace, &params.owner_id);
        let mut attempt = 0u32;

        loop {
            let entry = self
                .engine
                .lookup(&params.namespace, &params.owner_id)
                .await?
                .ok_or_else(|| RegistryError::NotFound {
                    namespace: params.namespace.clone(),
                    owner_id: params.owner_id.clone(),
                })?;

            let mut record = entry.record;
            record.current_players = params.current_players;
            record.current_clients = params.current_clients;

            let write = StorageWrite::public(key.clone(), record.encode()?);
            match self
                .storage
                .write(write, WriteCondition::IfVersion(entry.version))
                .await
            {
                Ok(_) => return Ok(record),
                Err(RegistryError::VersionConflict { .. }) if attempt < self.max_update_retries => {
                    attempt += 1;
                    tracing::debug!(
                        namespace = %params.namespace,
                        owner_id = %params.owner_id,
                        attempt,
                        "update lost a version race, retrying"
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Remove a record. Absent records are not an error.
    pub async fn delete(&self, namespace: &str, owner_id: &str) -> Result<()> {
        self.storage
            .delete(&record_key(namespace, owner_id), WriteCondition::Any)
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::gc::{GarbageCollector, InMemoryAccounts};
    use crate::liveness::{InMemoryMatchOracle, LivenessVerifier};
    use crate::storage::{InMemoryStorage, ListPage, ObjectKey, StoredObject};

    /// Storage that reports a version conflict on the first N conditional writes
    struct Contended {
        inner: InMemoryStorage,
        conflicts_left: AtomicU32,
    }

    #[async_trait]
    impl StorageBackend for Contended {
        async fn read(&self, key: &ObjectKey) -> Result<Option<StoredObject>> {
            self.inner.read(key).await
        }

        async fn write(&self, write: StorageWrite, condition: WriteCondition) -> Result<String> {
            if matches!(condition, WriteCondition::IfVersion(_))
                && self
                    .conflicts_left
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                    .is_ok()
            {
                return Err(RegistryError::VersionConflict {
                    namespace: write.key.namespace,
                    owner_id: write.key.owner_id,
                });
            }
            self.inner.write(write, condition).await
        }

        async fn delete(&self, key: &ObjectKey, condition: WriteCondition) -> Result<()> {
            self.inner.delete(key, condition).await
        }

        async fn list(&self, namespace: &str, limit: usize, cursor: Option<&str>) -> Result<ListPage> {
            self.inner.list(namespace, limit, cursor).await
        }

        async fn health_check(&self) -> Result<()> {
            Ok(())
        }

        fn name(&self) -> &'static str {
            "contended"
        }
    }

    fn writer(storage: Arc<dyn StorageBackend>, retries: u32) -> MatchWriter {
        let oracle = Arc::new(InMemoryMatchOracle::with_matches(["m1"]));
        let engine = QueryEngine::new(
            storage.clone(),
            LivenessVerifier::new(oracle),
            GarbageCollector::new(Arc::new(InMemoryAccounts::new()), storage.clone(), true),
            100,
        );
        MatchWriter::new(storage, engine, retries)
    }

    fn init_params() -> InitParams {
        InitParams {
            namespace: "arena".to_string(),
            owner_id: "srv1".to_string(),
            match_id: "m1".to_string(),
            max_capacity: 10,
        }
    }

    fn update_params(players: u32, clients: u32) -> UpdateParams {
        UpdateParams {
            namespace: "arena".to_string(),
            owner_id: "srv1".to_string(),
            current_players: players,
            current_clients: clients,
        }
    }

    #[tokio::test]
    async fn test_update_retries_after_conflict() {
        let storage = Arc::new(Contended {
            inner: InMemoryStorage::new(),
            conflicts_left: AtomicU32::new(2),
        });
        let writer = writer(storage.clone(), 3);
        writer.init(init_params()).await.unwrap();

        let record = writer.update(update_params(4, 5)).await.unwrap();
        assert_eq!(record.current_players, 4);
        assert_eq!(storage.conflicts_left.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_update_gives_up_after_retries() {
        let storage = Arc::new(Contended {
            inner: InMemoryStorage::new(),
            conflicts_left: AtomicU32::new(10),
        });
        let writer = writer(storage, 1);
        writer.init(init_params()).await.unwrap();

        let err = writer.update(update_params(1, 1)).await.unwrap_err();
        assert!(matches!(err, RegistryError::VersionConflict { .. }));
    }

    #[tokio::test]
    async fn test_update_missing_record() {
        let storage = Arc::new(InMemoryStorage::new());
        let writer = writer(storage.clone(), 3);

        let err = writer.update(update_params(1, 1)).await.unwrap_err();
        assert!(matches!(err, RegistryError::NotFound { .. }));
        assert!(storage.is_empty());
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let storage = Arc::new(InMemoryStorage::new());
        let writer = writer(storage.clone(), 3);
        writer.init(init_params()).await.unwrap();

        writer.delete("arena", "srv1").await.unwrap();
        writer.delete("arena", "srv1").await.unwrap();
        assert!(storage.is_empty());
    }
}
