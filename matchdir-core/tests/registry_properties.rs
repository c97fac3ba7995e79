//! Registry behaviour tests
//!
//! Each test drives the public `MatchRegistry` API against the in-memory
//! collaborators.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use matchdir_core::{
    record_key, FileStorage, InMemoryAccounts, InMemoryMatchOracle, InMemoryStorage, InitParams,
    ListPage, MatchOracle, MatchRecord, MatchRegistry, ObjectKey, RecordingProvisioner,
    RegistryConfig,
    RegistryError, Result, StorageBackend, StorageWrite, StoredObject, UpdateParams,
    WriteCondition,
};

struct Harness {
    storage: Arc<InMemoryStorage>,
    oracle: Arc<InMemoryMatchOracle>,
    accounts: Arc<InMemoryAccounts>,
    provisioner: Arc<RecordingProvisioner>,
    registry: MatchRegistry,
}

fn harness(config: RegistryConfig) -> Harness {
    let storage = Arc::new(InMemoryStorage::new());
    let oracle = Arc::new(InMemoryMatchOracle::new());
    let accounts = Arc::new(InMemoryAccounts::new());
    let provisioner = Arc::new(RecordingProvisioner::new());
    let registry = MatchRegistry::builder()
        .storage(storage.clone())
        .oracle(oracle.clone())
        .accounts(accounts.clone())
        .provisioner(provisioner.clone())
        .config(config)
        .build();
    Harness {
        storage,
        oracle,
        accounts,
        provisioner,
        registry,
    }
}

impl Harness {
    async fn create(&self, owner: &str, match_id: &str, max_capacity: u32) {
        self.oracle.start_match(match_id);
        self.registry
            .create_match(InitParams {
                namespace: "arena".to_string(),
                owner_id: owner.to_string(),
                match_id: match_id.to_string(),
                max_capacity,
            })
            .await
            .expect("create_match");
    }

    async fn update(&self, owner: &str, players: u32, clients: u32) -> Result<MatchRecord> {
        self.registry
            .update_match(UpdateParams {
                namespace: "arena".to_string(),
                owner_id: owner.to_string(),
                current_players: players,
                current_clients: clients,
            })
            .await
    }
}

#[tokio::test]
async fn test_create_is_last_writer_wins() {
    let h = harness(RegistryConfig::default());
    h.create("srv1", "m1", 10).await;
    h.create("srv1", "m2", 6).await;

    let entry = h.registry.query_one("arena", "srv1").await.unwrap().unwrap();
    assert_eq!(entry.record.match_id, "m2");
    assert_eq!(entry.record.max_capacity, 6);

    let all = h.registry.query_many("arena", None, None).await.unwrap();
    assert_eq!(all.len(), 1);
}

#[tokio::test]
async fn test_update_preserves_identity_fields() {
    let h = harness(RegistryConfig::default());
    h.create("srv1", "m1", 10).await;

    h.update("srv1", 7, 9).await.unwrap();

    let record = h.registry.query_one("arena", "srv1").await.unwrap().unwrap().record;
    assert_eq!(record.match_id, "m1");
    assert_eq!(record.max_capacity, 10);
    assert_eq!(record.namespace, "arena");
    assert_eq!(record.owner_id, "srv1");
    assert_eq!((record.current_players, record.current_clients), (7, 9));
}

#[tokio::test]
async fn test_update_without_create_fails_and_creates_nothing() {
    let h = harness(RegistryConfig::default());

    let err = h.update("ghost", 1, 1).await.unwrap_err();
    assert!(matches!(err, RegistryError::NotFound { .. }));
    assert!(h.storage.is_empty());
    assert!(h.registry.query_one("arena", "ghost").await.unwrap().is_none());
}

#[tokio::test]
async fn test_update_of_dead_match_fails() {
    let h = harness(RegistryConfig::default());
    h.create("srv1", "m1", 10).await;
    h.oracle.end_match("m1");

    let err = h.update("srv1", 1, 1).await.unwrap_err();
    assert_eq!(err.error_code(), "NOT_FOUND");
    assert_eq!(h.accounts.removal_count("srv1"), 1);
}

#[tokio::test]
async fn test_update_after_delete_does_not_resurrect() {
    let h = harness(RegistryConfig::default());
    h.create("srv1", "m1", 10).await;
    h.registry.delete_match("arena", "srv1").await.unwrap();

    assert!(h.update("srv1", 3, 3).await.is_err());
    assert!(h.storage.is_empty());
}

/// Storage where another writer deletes (and optionally re-registers) the
/// record between an update's read and its conditional write
struct Interleaved<S> {
    inner: S,
    reregister: Option<MatchRecord>,
    fired: AtomicBool,
}

impl<S> Interleaved<S> {
    fn new(inner: S, reregister: Option<MatchRecord>) -> Self {
        Self {
            inner,
            reregister,
            fired: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl<S: StorageBackend> StorageBackend for Interleaved<S> {
    async fn read(&self, key: &ObjectKey) -> Result<Option<StoredObject>> {
        self.inner.read(key).await
    }

    async fn write(&self, write: StorageWrite, condition: WriteCondition) -> Result<String> {
        let conditional = matches!(condition, WriteCondition::IfVersion(_));
        if conditional && !self.fired.swap(true, Ordering::SeqCst) {
            self.inner.delete(&write.key, WriteCondition::Any).await?;
            if let Some(record) = &self.reregister {
                let fresh = StorageWrite::public(record.key(), record.encode()?);
                self.inner.write(fresh, WriteCondition::Any).await?;
            }
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
        self.inner.health_check().await
    }

    fn name(&self) -> &'static str {
        "interleaved"
    }
}

fn temp_dir(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "matchdir-registry-{}-{}",
        tag,
        std::process::id()
    ));
    let _ = std::fs::remove_dir_all(&dir);
    dir
}

fn registry_over(storage: Arc<dyn StorageBackend>, live: &[&str]) -> MatchRegistry {
    MatchRegistry::builder()
        .storage(storage)
        .oracle(Arc::new(InMemoryMatchOracle::with_matches(live.iter().copied())))
        .build()
}

async fn create_srv1(registry: &MatchRegistry) {
    registry
        .create_match(InitParams {
            namespace: "arena".to_string(),
            owner_id: "srv1".to_string(),
            match_id: "m1".to_string(),
            max_capacity: 10,
        })
        .await
        .unwrap();
}

fn update_srv1() -> UpdateParams {
    UpdateParams {
        namespace: "arena".to_string(),
        owner_id: "srv1".to_string(),
        current_players: 3,
        current_clients: 3,
    }
}

#[tokio::test]
async fn test_delete_during_update_is_not_undone() {
    let storage = Arc::new(Interleaved::new(InMemoryStorage::new(), None));
    let registry = registry_over(storage.clone(), &["m1"]);
    create_srv1(&registry).await;

    let err = registry.update_match(update_srv1()).await.unwrap_err();
    assert!(matches!(err, RegistryError::NotFound { .. }));
    assert!(storage.inner.is_empty());
}

#[tokio::test]
async fn test_delete_during_update_is_not_undone_on_file_storage() {
    let dir = temp_dir("delete-during-update");
    let storage = Arc::new(Interleaved::new(FileStorage::new(&dir).unwrap(), None));
    let registry = registry_over(storage.clone(), &["m1"]);
    create_srv1(&registry).await;

    let err = registry.update_match(update_srv1()).await.unwrap_err();
    assert!(matches!(err, RegistryError::NotFound { .. }));
    assert!(storage.inner.read(&record_key("arena", "srv1")).await.unwrap().is_none());
    assert!(storage.inner.list("arena", 10, None).await.unwrap().objects.is_empty());

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn test_update_racing_reregistration_keeps_new_identity_on_file_storage() {
    let dir = temp_dir("reregister-during-update");
    let fresh = MatchRecord::new("arena", "srv1", "m_new", 4);
    let storage = Arc::new(Interleaved::new(FileStorage::new(&dir).unwrap(), Some(fresh)));
    let registry = registry_over(storage.clone(), &["m1", "m_new"]);
    create_srv1(&registry).await;

    // the retry lands on the new registration, never the old identity
    let record = registry.update_match(update_srv1()).await.unwrap();
    assert_eq!(record.match_id, "m_new");
    assert_eq!(record.max_capacity, 4);

    let stored = registry.query_one("arena", "srv1").await.unwrap().unwrap().record;
    assert_eq!(stored.match_id, "m_new");
    assert_eq!(stored.max_capacity, 4);
    assert_eq!(stored.current_players, 3);

    let _ = std::fs::remove_dir_all(&dir);
}

/// Oracle that sees the owner of `m_old` register `m_new` while it is
/// answering that `m_old` is gone
struct ReregisteringOracle {
    storage: Arc<InMemoryStorage>,
}

#[async_trait]
impl MatchOracle for ReregisteringOracle {
    async fn match_exists(&self, match_id: &str) -> Result<bool> {
        if match_id != "m_old" {
            return Ok(true);
        }
        let fresh = MatchRecord::new("arena", "srv1", "m_new", 8);
        self.storage
            .write(StorageWrite::public(fresh.key(), fresh.encode()?), WriteCondition::Any)
            .await?;
        Ok(false)
    }

    fn name(&self) -> &'static str {
        "reregistering"
    }
}

#[tokio::test]
async fn test_prune_spares_registration_written_after_verdict() {
    let storage = Arc::new(InMemoryStorage::new());
    let stale = MatchRecord::new("arena", "srv1", "m_old", 8);
    storage
        .write(StorageWrite::public(stale.key(), stale.encode().unwrap()), WriteCondition::Any)
        .await
        .unwrap();

    let accounts = Arc::new(InMemoryAccounts::new());
    let registry = MatchRegistry::builder()
        .storage(storage.clone())
        .oracle(Arc::new(ReregisteringOracle {
            storage: storage.clone(),
        }))
        .accounts(accounts.clone())
        .build();

    let found = registry.query_many("arena", None, None).await.unwrap();
    assert!(found.is_empty());
    assert_eq!(accounts.removal_count("srv1"), 1);

    let entry = registry.query_one("arena", "srv1").await.unwrap().unwrap();
    assert_eq!(entry.record.match_id, "m_new");
}

#[tokio::test]
async fn test_capacity_filter_excludes_full_records() {
    let h = harness(RegistryConfig::default());
    for (owner, players) in [("srv0", 0), ("srv1", 1), ("srv2", 2)] {
        h.create(owner, &format!("m-{}", owner), 4).await;
        h.update(owner, players, players).await.unwrap();
    }

    let found = h.registry.query_many("arena", Some(2), None).await.unwrap();
    let mut owners: Vec<_> = found.iter().map(|e| e.record.owner_id.clone()).collect();
    owners.sort();
    assert_eq!(owners, vec!["srv0".to_string(), "srv1".to_string()]);

    let unfiltered = h.registry.query_many("arena", None, None).await.unwrap();
    assert_eq!(unfiltered.len(), 3);
}

#[tokio::test]
async fn test_result_bound_respected_for_any_page_size() {
    for page_size in [1, 2, 3, 5, 100] {
        let h = harness(RegistryConfig::builder().page_size(page_size).build());
        for i in 0..5 {
            h.create(&format!("srv{}", i), &format!("m{}", i), 8).await;
        }

        let found = h.registry.query_many("arena", None, Some(2)).await.unwrap();
        assert_eq!(found.len(), 2, "page size {}", page_size);

        let all = h.registry.query_many("arena", None, None).await.unwrap();
        assert_eq!(all.len(), 5, "page size {}", page_size);
    }
}

#[tokio::test]
async fn test_delete_is_idempotent() {
    let h = harness(RegistryConfig::default());
    h.registry.delete_match("arena", "never").await.unwrap();
    h.registry.delete_match("arena", "never").await.unwrap();

    h.create("srv1", "m1", 4).await;
    h.registry.delete_match("arena", "srv1").await.unwrap();
    h.registry.delete_match("arena", "srv1").await.unwrap();
    assert!(h.registry.query_one("arena", "srv1").await.unwrap().is_none());
}

#[tokio::test]
async fn test_dead_match_pruned_once() {
    let h = harness(RegistryConfig::default());
    h.create("srv1", "m1", 4).await;
    h.create("srv2", "m2", 4).await;
    h.oracle.end_match("m1");

    let found = h.registry.query_many("arena", None, None).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].record.owner_id, "srv2");
    assert_eq!(h.accounts.removed(), vec!["srv1".to_string()]);

    // the orphan's storage entry went with it, so a second scan finds nothing to prune
    h.registry.query_many("arena", None, None).await.unwrap();
    assert_eq!(h.accounts.removal_count("srv1"), 1);
    assert_eq!(h.storage.namespace_len("arena"), 1);
}

#[tokio::test]
async fn test_dead_match_kept_in_store_when_purge_disabled() {
    let h = harness(RegistryConfig::builder().purge_orphaned_records(false).build());
    h.create("srv1", "m1", 4).await;
    h.oracle.end_match("m1");

    assert!(h.registry.query_many("arena", None, None).await.unwrap().is_empty());
    assert_eq!(h.storage.namespace_len("arena"), 1);
    assert_eq!(h.accounts.removal_count("srv1"), 1);
}

#[tokio::test]
async fn test_corrupt_point_lookup_is_empty() {
    let h = harness(RegistryConfig::default());
    h.storage
        .write(
            StorageWrite::public(record_key("arena", "srv1"), "[1,2,3]".to_string()),
            WriteCondition::Any,
        )
        .await
        .unwrap();

    assert!(h.registry.query_one("arena", "srv1").await.unwrap().is_none());
    assert_eq!(h.accounts.removed(), vec!["srv1".to_string()]);
}

#[tokio::test]
async fn test_scenario_create_update_query() {
    let h = harness(RegistryConfig::default());
    h.create("srv1", "m1", 10).await;
    h.update("srv1", 4, 5).await.unwrap();

    let record = h.registry.query_one("arena", "srv1").await.unwrap().unwrap().record;
    assert_eq!(
        record,
        MatchRecord {
            namespace: "arena".to_string(),
            owner_id: "srv1".to_string(),
            match_id: "m1".to_string(),
            max_capacity: 10,
            current_players: 4,
            current_clients: 5,
        }
    );
}

#[tokio::test]
async fn test_find_joinable_skips_full_and_provisions_when_all_full() {
    let h = harness(RegistryConfig::default());
    h.create("srv1", "m1", 2).await;
    h.update("srv1", 2, 2).await.unwrap();
    h.create("srv2", "m2", 2).await;

    assert_eq!(
        h.registry.find_joinable("arena", Some(2)).await.unwrap().as_deref(),
        Some("m2")
    );
    assert!(h.provisioner.requests().is_empty());

    h.update("srv2", 2, 2).await.unwrap();
    assert_eq!(h.registry.find_joinable("arena", Some(2)).await.unwrap(), None);
    assert_eq!(h.provisioner.requests(), vec!["arena".to_string()]);
}

#[tokio::test]
async fn test_concurrent_updates_all_land() {
    let h = harness(RegistryConfig::builder().max_update_retries(64).build());
    h.create("srv1", "m1", 100).await;

    let mut tasks = Vec::new();
    for i in 1..=8u32 {
        let registry = h.registry.clone();
        tasks.push(tokio::spawn(async move {
            registry
                .update_match(UpdateParams {
                    namespace: "arena".to_string(),
                    owner_id: "srv1".to_string(),
                    current_players: i,
                    current_clients: i,
                })
                .await
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let record = h.registry.query_one("arena", "srv1").await.unwrap().unwrap().record;
    assert!((1..=8).contains(&record.current_players));
    assert_eq!(record.current_players, record.current_clients);
    assert_eq!(record.match_id, "m1");
}

/// Storage whose `list` starts failing after a number of successful calls
struct FlakyList {
    inner: InMemoryStorage,
    healthy_lists: usize,
    calls: AtomicUsize,
}

#[async_trait]
impl StorageBackend for FlakyList {
    async fn read(&self, key: &ObjectKey) -> Result<Option<StoredObject>> {
        self.inner.read(key).await
    }

    async fn write(&self, write: StorageWrite, condition: WriteCondition) -> Result<String> {
        self.inner.write(write, condition).await
    }

    async fn delete(&self, key: &ObjectKey, condition: WriteCondition) -> Result<()> {
        self.inner.delete(key, condition).await
    }

    async fn list(&self, namespace: &str, limit: usize, cursor: Option<&str>) -> Result<ListPage> {
        if self.calls.fetch_add(1, Ordering::SeqCst) >= self.healthy_lists {
            return Err(RegistryError::storage("flaky", "connection reset"));
        }
        self.inner.list(namespace, limit, cursor).await
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "flaky"
    }
}

#[tokio::test]
async fn test_scan_failure_discards_partial_results() {
    let storage = Arc::new(FlakyList {
        inner: InMemoryStorage::new(),
        healthy_lists: 1,
        calls: AtomicUsize::new(0),
    });
    let oracle = Arc::new(InMemoryMatchOracle::new());
    let registry = MatchRegistry::builder()
        .storage(storage.clone())
        .oracle(oracle.clone())
        .config(RegistryConfig::builder().page_size(2).build())
        .build();

    for i in 0..4 {
        let match_id = format!("m{}", i);
        oracle.start_match(match_id.clone());
        registry
            .create_match(InitParams {
                namespace: "arena".to_string(),
                owner_id: format!("srv{}", i),
                match_id,
                max_capacity: 4,
            })
            .await
            .unwrap();
    }

    let err = registry.query_many("arena", None, None).await.unwrap_err();
    assert_eq!(err.error_code(), "STORAGE_UNAVAILABLE");
    assert_eq!(storage.calls.load(Ordering::SeqCst), 2);

    // a bound satisfied by the first page never touches the failing second page
    storage.calls.store(0, Ordering::SeqCst);
    let found = registry.query_many("arena", None, Some(2)).await.unwrap();
    assert_eq!(found.len(), 2);
}
