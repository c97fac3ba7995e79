//! Pluggable Storage Backend
//!
//! The registry persists match records in an external namespaced key-value
//! store offering four primitives: point read, point write, point delete and
//! cursor-paginated listing of a namespace. There are no transactions and no
//! query language; every filter the registry applies happens above this
//! layer.
//!
//! Two backends ship with the crate:
//! - [`InMemoryStorage`]: default, process-local, lost on restart
//! - [`FileStorage`]: one JSON file per key, for single-node deployments
//!
//! # Example
//!
//! ```rust
//! use matchdir_core::storage::{InMemoryStorage, ObjectKey, StorageBackend, StorageWrite, WriteCondition};
//!
//! # tokio_test_block_on(async {
//! let storage = InMemoryStorage::new();
//! let key = ObjectKey::new("arena", "MatchInfo", "srv1");
//!
//! storage
//!     .write(StorageWrite::public(key.clone(), "{}".to_string()), WriteCondition::Any)
//!     .await
//!     .unwrap();
//! assert!(storage.read(&key).await.unwrap().is_some());
//! # });
//! # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

mod file;
mod memory;

pub use file::FileStorage;
pub use memory::InMemoryStorage;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Address of one stored object
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectKey {
    /// Collection the object lives in
    pub namespace: String,
    /// Record kind identifier within the collection
    pub kind: String,
    /// Owning user/server id
    pub owner_id: String,
}

impl ObjectKey {
    pub fn new(
        namespace: impl Into<String>,
        kind: impl Into<String>,
        owner_id: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            kind: kind.into(),
            owner_id: owner_id.into(),
        }
    }
}

/// Who may read an object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadPermission {
    NoRead,
    OwnerRead,
    #[default]
    PublicRead,
}

/// Who may write an object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WritePermission {
    NoWrite,
    #[default]
    OwnerWrite,
}

/// An object as returned by the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub key: ObjectKey,
    /// Opaque encoded value
    pub value: String,
    /// Opaque version token, changes on every write and is never reused
    /// for the same key, even after a delete
    pub version: String,
    pub read: ReadPermission,
    pub write: WritePermission,
}

/// A pending upsert
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageWrite {
    pub key: ObjectKey,
    pub value: String,
    pub read: ReadPermission,
    pub write: WritePermission,
}

impl StorageWrite {
    /// Public-read, owner-write upsert (the visibility every registry record uses)
    pub fn public(key: ObjectKey, value: String) -> Self {
        Self {
            key,
            value,
            read: ReadPermission::PublicRead,
            write: WritePermission::OwnerWrite,
        }
    }
}

/// Precondition checked atomically with a write or delete
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum WriteCondition {
    /// Unconditional upsert
    #[default]
    Any,
    /// Only write if the stored version still equals this token.
    /// Fails with `VersionConflict` if it changed or the key is gone.
    IfVersion(String),
}

/// One page of a namespace listing
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    pub objects: Vec<StoredObject>,
    /// Continuation cursor; `None` on the final page
    pub cursor: Option<String>,
}

impl ListPage {
    pub fn is_last(&self) -> bool {
        self.cursor.as_deref().map_or(true, str::is_empty)
    }
}

/// Storage backend trait for the registry's key-value substrate
///
/// Implement this trait to put the registry on top of another store.
/// All methods take `&self`; backends handle their own synchronization.
/// Any call may fail with `StorageUnavailable`, which callers propagate
/// without retrying.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Point lookup. `Ok(None)` when the key is absent.
    async fn read(&self, key: &ObjectKey) -> Result<Option<StoredObject>>;

    /// Upsert, returning the new version token
    async fn write(&self, write: StorageWrite, condition: WriteCondition) -> Result<String>;

    /// Idempotent removal; an absent key is not an error under either
    /// condition. With `IfVersion`, a present key holding another version
    /// is left alone and `VersionConflict` returned.
    async fn delete(&self, key: &ObjectKey, condition: WriteCondition) -> Result<()>;

    /// List up to `limit` objects of a namespace starting after `cursor`.
    /// No ordering guarantee is part of the contract.
    async fn list(&self, namespace: &str, limit: usize, cursor: Option<&str>) -> Result<ListPage>;

    /// Check if backend is healthy
    async fn health_check(&self) -> Result<()>;

    /// Get backend name (for logging/debugging)
    fn name(&self) -> &'static str;
}

/// Opaque cursor for the owner-ordered backends: `hex(kind).hex(owner)`
pub(crate) fn encode_cursor(kind: &str, owner_id: &str) -> String {
    format!("{}.{}", hex::encode(kind), hex::encode(owner_id))
}

pub(crate) fn decode_cursor(cursor: &str) -> Option<(String, String)> {
    let (kind, owner) = cursor.split_once('.')?;
    let kind = String::from_utf8(hex::decode(kind).ok()?).ok()?;
    let owner = String::from_utf8(hex::decode(owner).ok()?).ok()?;
    Some((kind, owner))
}
