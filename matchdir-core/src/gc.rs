//! Orphaned record cleanup
//!
//! When a scan or lookup finds a record whose payload is corrupt or whose
//! match is gone, it hands the key to [`GarbageCollector::prune`]. Pruning
//! removes the owner's account (the signal the game-server fleet uses to
//! re-register fresh) and, unless disabled, the stale storage entry. The
//! entry is only deleted while it still holds the version that was judged
//! orphaned, so a registration written in the meantime survives.
//! Failures here are logged and swallowed; they never fail the query that
//! found the orphan.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::{RegistryError, Result};
use crate::storage::{ObjectKey, StorageBackend, WriteCondition};

/// Capability to delete an owner's account
#[async_trait]
pub trait AccountManager: Send + Sync {
    async fn delete_owner(&self, owner_id: &str) -> Result<()>;

    fn name(&self) -> &'static str;
}

/// Why a record is being pruned
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PruneReason {
    CorruptPayload(String),
    MatchGone { match_id: String },
    OracleUnreachable { match_id: String, reason: String },
}

impl std::fmt::Display for PruneReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PruneReason::CorruptPayload(reason) => write!(f, "corrupt payload ({})", reason),
            PruneReason::MatchGone { match_id } => write!(f, "match '{}' is gone", match_id),
            PruneReason::OracleUnreachable { match_id, reason } => {
                write!(f, "match '{}' unverifiable ({})", match_id, reason)
            }
        }
    }
}

/// What a prune actually managed to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PruneOutcome {
    pub account_removed: bool,
    pub record_removed: bool,
}

/// Removes owners (and optionally storage entries) of orphaned records
#[derive(Clone)]
pub struct GarbageCollector {
    accounts: Arc<dyn AccountManager>,
    storage: Arc<dyn StorageBackend>,
    purge_records: bool,
}

impl GarbageCollector {
    pub fn new(
        accounts: Arc<dyn AccountManager>,
        storage: Arc<dyn StorageBackend>,
        purge_records: bool,
    ) -> Self {
        Self {
            accounts,
            storage,
            purge_records,
        }
    }

    /// Remove the owner account directly (RemoveOwnerAccount)
    pub async fn remove_owner(&self, owner_id: &str) -> Result<()> {
        self.accounts.delete_owner(owner_id).await
    }

    /// Clean up after one orphaned record. Calls the account manager exactly once.
    ///
    /// `version` is the token of the object that was inspected.
    pub async fn prune(
        &self,
        key: &ObjectKey,
        version: &str,
        reason: &PruneReason,
    ) -> PruneOutcome {
        tracing::warn!(
            namespace = %key.namespace,
            owner_id = %key.owner_id,
            "pruning orphaned match record: {}",
            reason
        );

        let mut outcome = PruneOutcome::default();

        match self.accounts.delete_owner(&key.owner_id).await {
            Ok(()) => outcome.account_removed = true,
            Err(e) => tracing::warn!(
                owner_id = %key.owner_id,
                accounts = self.accounts.name(),
                "failed to remove owner account: {}",
                e
            ),
        }

        if self.purge_records {
            let condition = WriteCondition::IfVersion(version.to_string());
            match self.storage.delete(key, condition).await {
                Ok(()) => outcome.record_removed = true,
                Err(RegistryError::VersionConflict { .. }) => tracing::info!(
                    namespace = %key.namespace,
                    owner_id = %key.owner_id,
                    "record rewritten since inspection, keeping it"
                ),
                Err(e) => tracing::warn!(
                    namespace = %key.namespace,
                    owner_id = %key.owner_id,
                    backend = self.storage.name(),
                    "failed to delete orphaned record: {}",
                    e
                ),
            }
        }

        outcome
    }
}

/// Account manager that records deletions instead of performing them
///
/// Used by tests and by the server when no account service is configured.
#[derive(Debug, Default)]
pub struct InMemoryAccounts {
    removed: Mutex<Vec<String>>,
}

impl InMemoryAccounts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Owner ids passed to `delete_owner`, in call order
    pub fn removed(&self) -> Vec<String> {
        self.removed.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn removal_count(&self, owner_id: &str) -> usize {
        self.removed
            .lock()
            .map(|r| r.iter().filter(|id| *id == owner_id).count())
            .unwrap_or(0)
    }
}

#[async_trait]
impl AccountManager for InMemoryAccounts {
    async fn delete_owner(&self, owner_id: &str) -> Result<()> {
        let mut removed = self.removed.lock().map_err(|_| RegistryError::AccountCleanupFailed {
            owner_id: owner_id.to_string(),
            reason: "account registry lock poisoned".to_string(),
        })?;
        removed.push(owner_id.to_string());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "in-memory"
    }
}
