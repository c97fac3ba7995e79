//! Query engine
//!
//! Resolves a [`QueryRequest`] into live, filtered, size-bounded match
//! records on top of the store's four primitives.
//!
//! ## Modes
//!
//! - **Point lookup** (`owner_id` set and non-empty): one `read`. Absent,
//!   corrupt or dead records yield an empty result; the latter two are
//!   pruned. The capacity filter is ignored.
//! - **Scan** (no owner): pages through the namespace with `list`, and for
//!   every object
//!   1. decodes it (corrupt → prune, skip)
//!   2. checks liveness (not live → prune, skip)
//!   3. applies the capacity filter (`current_players >= filter` → skip)
//!   4. appends it, stopping the moment `max_results` is reached, even
//!      mid-page.
//!
//! Results keep the store's listing order. A storage failure aborts the
//! scan and discards anything accumulated so far.

use std::sync::Arc;

use crate::error::Result;
use crate::gc::{GarbageCollector, PruneReason};
use crate::liveness::{Liveness, LivenessVerifier};
use crate::record::{record_key, MatchRecord, MATCH_RECORD_KIND};
use crate::storage::{StorageBackend, StoredObject};

/// A query against one namespace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRequest {
    pub namespace: String,
    /// Set and non-empty for a point lookup
    pub owner_id: Option<String>,
    /// Keep only records with fewer current players than this
    pub capacity_filter: Option<u32>,
    /// Result bound; `None` is unbounded
    pub max_results: Option<usize>,
}

impl QueryRequest {
    /// Point lookup of one owner's record
    pub fn owner(namespace: impl Into<String>, owner_id: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            owner_id: Some(owner_id.into()),
            capacity_filter: None,
            max_results: Some(1),
        }
    }

    /// Unfiltered, unbounded scan of a namespace
    pub fn scan(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            owner_id: None,
            capacity_filter: None,
            max_results: None,
        }
    }

    pub fn with_capacity_filter(mut self, filter: u32) -> Self {
        self.capacity_filter = Some(filter);
        self
    }

    pub fn with_max_results(mut self, max: usize) -> Self {
        self.max_results = Some(max);
        self
    }

    /// Build from the signed wire values, where negative means "no limit"
    pub fn from_legacy(
        namespace: impl Into<String>,
        owner_id: &str,
        capacity_filter: i64,
        max_results: i64,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            owner_id: (!owner_id.is_empty()).then(|| owner_id.to_string()),
            capacity_filter: non_negative(capacity_filter)
                .map(|v| u32::try_from(v).unwrap_or(u32::MAX)),
            max_results: non_negative(max_results).map(|v| usize::try_from(v).unwrap_or(usize::MAX)),
        }
    }

    pub fn is_point_lookup(&self) -> bool {
        self.owner_id.as_deref().map_or(false, |id| !id.is_empty())
    }

    fn is_full(&self, found: usize) -> bool {
        self.max_results.map_or(false, |max| found >= max)
    }
}

fn non_negative(value: i64) -> Option<u64> {
    u64::try_from(value).ok()
}

/// A live record together with its stored form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchEntry {
    pub record: MatchRecord,
    /// Raw stored value, returned verbatim by QueryOneMatch
    pub payload: String,
    /// Store version token, for conditional write-back
    pub version: String,
}

/// Executes queries against a storage backend
#[derive(Clone)]
pub struct QueryEngine {
    storage: Arc<dyn StorageBackend>,
    verifier: LivenessVerifier,
    gc: GarbageCollector,
    page_size: usize,
}

impl QueryEngine {
    pub fn new(
        storage: Arc<dyn StorageBackend>,
        verifier: LivenessVerifier,
        gc: GarbageCollector,
        page_size: usize,
    ) -> Self {
        Self {
            storage,
            verifier,
            gc,
            page_size: page_size.max(1),
        }
    }

    /// Run a query in whichever mode the request selects
    pub async fn run(&self, request: &QueryRequest) -> Result<Vec<MatchEntry>> {
        match request.owner_id.as_deref() {
            Some(owner_id) if !owner_id.is_empty() => {
                if request.max_results == Some(0) {
                    return Ok(Vec::new());
                }
                Ok(self
                    .lookup(&request.namespace, owner_id)
                    .await?
                    .into_iter()
                    .collect())
            }
            _ => self.scan(request).await,
        }
    }

    /// Fetch one owner's record if it exists, decodes and is live
    pub async fn lookup(&self, namespace: &str, owner_id: &str) -> Result<Option<MatchEntry>> {
        let key = record_key(namespace, owner_id);
        match self.storage.read(&key).await? {
            Some(object) => Ok(self.admit(object).await),
            None => {
                tracing::debug!(namespace, owner_id, "no match record stored");
                Ok(None)
            }
        }
    }

    async fn scan(&self, request: &QueryRequest) -> Result<Vec<MatchEntry>> {
        let mut results = Vec::new();
        let mut cursor: Option<String> = None;
        let mut pages = 0usize;

        while !request.is_full(results.len()) {
            let page = self
                .storage
                .list(&request.namespace, self.page_size, cursor.as_deref())
                .await?;
            pages += 1;
            tracing::debug!(
                namespace = %request.namespace,
                page = pages,
                objects = page.objects.len(),
                "scanning match records"
            );

            let last = page.is_last();
            for object in page.objects {
                if object.key.kind != MATCH_RECORD_KIND {
                    continue;
                }
                let Some(entry) = self.admit(object).await else {
                    continue;
                };
                if !entry.record.is_joinable(request.capacity_filter) {
                    continue;
                }
                results.push(entry);
                if request.is_full(results.len()) {
                    break;
                }
            }

            if last {
                break;
            }
            cursor = page.cursor;
        }

        tracing::debug!(
            namespace = %request.namespace,
            pages,
            found = results.len(),
            "scan complete"
        );
        Ok(results)
    }

    /// Decode and verify one stored object, pruning it if it is orphaned
    async fn admit(&self, object: StoredObject) -> Option<MatchEntry> {
        let record = match MatchRecord::decode(&object.value, &object.key) {
            Ok(record) => record,
            Err(e) => {
                self.gc
                    .prune(
                        &object.key,
                        &object.version,
                        &PruneReason::CorruptPayload(e.to_string()),
                    )
                    .await;
                return None;
            }
        };

        let reason = match self.verifier.verify(&record).await {
            Liveness::Live => {
                return Some(MatchEntry {
                    record,
                    payload: object.value,
                    version: object.version,
                })
            }
            Liveness::Gone => PruneReason::MatchGone {
                match_id: record.match_id,
            },
            Liveness::Unreachable(reason) => PruneReason::OracleUnreachable {
                match_id: record.match_id,
                reason,
            },
        };
        self.gc.prune(&object.key, &object.version, &reason).await;
        None
    }
}
