//! The match registry
//!
//! [`MatchRegistry`] wires storage, the liveness oracle, account cleanup and
//! provisioning together and exposes the seven directory operations. It
//! holds no per-request state, so one instance can serve any number of
//! concurrent callers.

use std::sync::Arc;

use rand::seq::SliceRandom;

use crate::config::{JoinSelection, RegistryConfig};
use crate::error::{RegistryError, Result};
use crate::gc::{AccountManager, GarbageCollector, InMemoryAccounts};
use crate::liveness::{InMemoryMatchOracle, Liveness, LivenessVerifier, MatchOracle};
use crate::mutation::{InitParams, MatchWriter, UpdateParams};
use crate::provision::{NoopProvisioner, Provisioner};
use crate::query::{MatchEntry, QueryEngine, QueryRequest};
use crate::record::MatchRecord;
use crate::storage::{InMemoryStorage, StorageBackend};

/// Directory of joinable matches
#[derive(Clone)]
pub struct MatchRegistry {
    storage: Arc<dyn StorageBackend>,
    verifier: LivenessVerifier,
    gc: GarbageCollector,
    engine: QueryEngine,
    writer: MatchWriter,
    provisioner: Arc<dyn Provisioner>,
    config: RegistryConfig,
}

impl MatchRegistry {
    /// Create a new registry builder
    pub fn builder() -> MatchRegistryBuilder {
        MatchRegistryBuilder::default()
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Name of the storage backend in use
    pub fn storage_name(&self) -> &'static str {
        self.storage.name()
    }

    pub async fn health_check(&self) -> Result<()> {
        self.storage.health_check().await
    }

    /// Find a match a new player can join, or ask for one to be provisioned.
    ///
    /// Returns the match id, or `None` after notifying the provisioner.
    pub async fn find_joinable(
        &self,
        namespace: &str,
        capacity_filter: Option<u32>,
    ) -> Result<Option<String>> {
        require("namespace", namespace)?;

        let sample = match self.config.join_selection {
            JoinSelection::First => 1,
            JoinSelection::Random { sample } => sample.max(1),
        };
        let mut request = QueryRequest::scan(namespace).with_max_results(sample);
        request.capacity_filter = capacity_filter;

        let candidates = self.engine.run(&request).await?;

        match pick(self.config.join_selection, &candidates) {
            Some(entry) => {
                tracing::debug!(
                    namespace,
                    match_id = %entry.record.match_id,
                    candidates = candidates.len(),
                    "joinable match found"
                );
                Ok(Some(entry.record.match_id.clone()))
            }
            None => {
                tracing::info!(
                    namespace,
                    provisioner = self.provisioner.name(),
                    "no joinable match found, requesting a new instance"
                );
                self.provisioner.request_match(namespace).await;
                Ok(None)
            }
        }
    }

    /// Delete an owner's account
    pub async fn remove_owner_account(&self, owner_id: &str) -> Result<()> {
        require("owner id", owner_id)?;
        self.gc.remove_owner(owner_id).await?;
        tracing::info!(owner_id, "removed owner account");
        Ok(())
    }

    /// Register a match, replacing whatever the owner advertised before
    pub async fn create_match(&self, params: InitParams) -> Result<MatchRecord> {
        require("namespace", &params.namespace)?;
        require("owner id", &params.owner_id)?;
        require("match id", &params.match_id)?;

        if self.config.verify_on_create {
            match self.verifier.verify_match(&params.match_id).await {
                Liveness::Live => {}
                Liveness::Gone => {
                    return Err(RegistryError::RecordOrphaned {
                        owner_id: params.owner_id,
                        match_id: params.match_id,
                    })
                }
                Liveness::Unreachable(reason) => {
                    return Err(RegistryError::OracleUnavailable { reason })
                }
            }
        }

        let record = self.writer.init(params).await?;
        tracing::info!(
            namespace = %record.namespace,
            owner_id = %record.owner_id,
            match_id = %record.match_id,
            max_capacity = record.max_capacity,
            "match registered"
        );
        Ok(record)
    }

    /// Overwrite the occupancy counters of a live record
    pub async fn update_match(&self, params: UpdateParams) -> Result<MatchRecord> {
        require("namespace", &params.namespace)?;
        require("owner id", &params.owner_id)?;

        let record = self.writer.update(params).await?;
        tracing::info!(
            namespace = %record.namespace,
            owner_id = %record.owner_id,
            players = record.current_players,
            clients = record.current_clients,
            "match updated"
        );
        Ok(record)
    }

    /// Remove an owner's record (idempotent)
    pub async fn delete_match(&self, namespace: &str, owner_id: &str) -> Result<()> {
        require("namespace", namespace)?;
        require("owner id", owner_id)?;

        self.writer.delete(namespace, owner_id).await?;
        tracing::info!(namespace, owner_id, "match record removed");
        Ok(())
    }

    /// One record. An empty owner id falls back to the first live record of the namespace.
    pub async fn query_one(&self, namespace: &str, owner_id: &str) -> Result<Option<MatchEntry>> {
        let request = QueryRequest::from_legacy(namespace, owner_id, -1, 1);
        Ok(self.engine.run(&request).await?.into_iter().next())
    }

    /// All live records of a namespace passing the capacity filter, up to `max_results`
    pub async fn query_many(
        &self,
        namespace: &str,
        capacity_filter: Option<u32>,
        max_results: Option<usize>,
    ) -> Result<Vec<MatchEntry>> {
        let request = QueryRequest {
            namespace: namespace.to_string(),
            owner_id: None,
            capacity_filter,
            max_results,
        };
        self.engine.run(&request).await
    }

    /// Run an arbitrary query
    pub async fn query(&self, request: &QueryRequest) -> Result<Vec<MatchEntry>> {
        self.engine.run(request).await
    }
}

fn pick(selection: JoinSelection, candidates: &[MatchEntry]) -> Option<&MatchEntry> {
    match selection {
        JoinSelection::First => candidates.first(),
        JoinSelection::Random { .. } => candidates.choose(&mut rand::thread_rng()),
    }
}

fn require(field: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        Err(RegistryError::MalformedRequest {
            reason: format!("{} must not be empty", field),
        })
    } else {
        Ok(())
    }
}

/// Builder for MatchRegistry
///
/// Every collaborator defaults to its in-memory implementation.
#[derive(Default)]
pub struct MatchRegistryBuilder {
    storage: Option<Arc<dyn StorageBackend>>,
    oracle: Option<Arc<dyn MatchOracle>>,
    accounts: Option<Arc<dyn AccountManager>>,
    provisioner: Option<Arc<dyn Provisioner>>,
    config: Option<RegistryConfig>,
}

impl MatchRegistryBuilder {
    pub fn storage(mut self, storage: Arc<dyn StorageBackend>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn oracle(mut self, oracle: Arc<dyn MatchOracle>) -> Self {
        self.oracle = Some(oracle);
        self
    }

    pub fn accounts(mut self, accounts: Arc<dyn AccountManager>) -> Self {
        self.accounts = Some(accounts);
        self
    }

    pub fn provisioner(mut self, provisioner: Arc<dyn Provisioner>) -> Self {
        self.provisioner = Some(provisioner);
        self
    }

    pub fn config(mut self, config: RegistryConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Build the registry
    pub fn build(self) -> MatchRegistry {
        let config = self.config.unwrap_or_default();
        let storage = self
            .storage
            .unwrap_or_else(|| Arc::new(InMemoryStorage::new()));
        let oracle = self
            .oracle
            .unwrap_or_else(|| Arc::new(InMemoryMatchOracle::new()));
        let accounts = self
            .accounts
            .unwrap_or_else(|| Arc::new(InMemoryAccounts::new()));
        let provisioner = self
            .provisioner
            .unwrap_or_else(|| Arc::new(NoopProvisioner::new()));

        let verifier = LivenessVerifier::new(oracle);
        let gc = GarbageCollector::new(accounts, Arc::clone(&storage), config.purge_orphaned_records);
        let engine = QueryEngine::new(
            Arc::clone(&storage),
            verifier.clone(),
            gc.clone(),
            config.page_size,
        );
        let writer = MatchWriter::new(Arc::clone(&storage), engine.clone(), config.max_update_retries);

        MatchRegistry {
            storage,
            verifier,
            gc,
            engine,
            writer,
            provisioner,
            config,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provision::RecordingProvisioner;

    struct Fixture {
        oracle: Arc<InMemoryMatchOracle>,
        provisioner: Arc<RecordingProvisioner>,
        registry: MatchRegistry,
    }

    fn fixture(config: RegistryConfig) -> Fixture {
        let oracle = Arc::new(InMemoryMatchOracle::new());
        let provisioner = Arc::new(RecordingProvisioner::new());
        let registry = MatchRegistry::builder()
            .oracle(oracle.clone())
            .provisioner(provisioner.clone())
            .config(config)
            .build();
        Fixture {
            oracle,
            provisioner,
            registry,
        }
    }

    fn init(owner: &str, match_id: &str) -> InitParams {
        InitParams {
            namespace: "arena".to_string(),
            owner_id: owner.to_string(),
            match_id: match_id.to_string(),
            max_capacity: 4,
        }
    }

    #[tokio::test]
    async fn test_create_requires_live_match() {
        let f = fixture(RegistryConfig::default());
        let err = f.registry.create_match(init("srv1", "m1")).await.unwrap_err();
        assert_eq!(err.error_code(), "RECORD_ORPHANED");

        f.oracle.start_match("m1");
        f.registry.create_match(init("srv1", "m1")).await.unwrap();
    }

    #[tokio::test]
    async fn test_create_without_verification() {
        let f = fixture(RegistryConfig::builder().verify_on_create(false).build());
        f.registry.create_match(init("srv1", "m1")).await.unwrap();
    }

    #[tokio::test]
    async fn test_empty_ids_are_malformed() {
        let f = fixture(RegistryConfig::default());
        let err = f.registry.delete_match("", "srv1").await.unwrap_err();
        assert!(matches!(err, RegistryError::MalformedRequest { .. }));
        let err = f.registry.remove_owner_account("").await.unwrap_err();
        assert!(matches!(err, RegistryError::MalformedRequest { .. }));
    }

    #[tokio::test]
    async fn test_find_joinable_provisions_when_empty() {
        let f = fixture(RegistryConfig::default());
        assert_eq!(f.registry.find_joinable("arena", Some(4)).await.unwrap(), None);
        assert_eq!(f.provisioner.requests(), vec!["arena".to_string()]);
    }

    #[tokio::test]
    async fn test_find_joinable_first() {
        let f = fixture(RegistryConfig::default());
        for (owner, m) in [("srv1", "m1"), ("srv2", "m2")] {
            f.oracle.start_match(m);
            f.registry.create_match(init(owner, m)).await.unwrap();
        }

        let found = f.registry.find_joinable("arena", None).await.unwrap();
        assert_eq!(found.as_deref(), Some("m1"));
        assert!(f.provisioner.requests().is_empty());
    }

    #[tokio::test]
    async fn test_find_joinable_random_picks_a_candidate() {
        let f = fixture(
            RegistryConfig::builder()
                .join_selection(JoinSelection::Random { sample: 8 })
                .build(),
        );
        for (owner, m) in [("srv1", "m1"), ("srv2", "m2"), ("srv3", "m3")] {
            f.oracle.start_match(m);
            f.registry.create_match(init(owner, m)).await.unwrap();
        }

        for _ in 0..10 {
            let found = f.registry.find_joinable("arena", Some(1)).await.unwrap().unwrap();
            assert!(["m1", "m2", "m3"].contains(&found.as_str()));
        }
    }

    #[tokio::test]
    async fn test_query_one_empty_owner_scans() {
        let f = fixture(RegistryConfig::default());
        f.oracle.start_match("m1");
        f.registry.create_match(init("srv1", "m1")).await.unwrap();

        let entry = f.registry.query_one("arena", "").await.unwrap().unwrap();
        assert_eq!(entry.record.owner_id, "srv1");
    }
}
