//! In-memory storage backend

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::RwLock;

use async_trait::async_trait;

use super::{
    decode_cursor, encode_cursor, ListPage, ObjectKey, StorageBackend, StorageWrite,
    StoredObject, WriteCondition,
};
use crate::error::{RegistryError, Result};

/// (kind, owner_id) ordering inside one namespace
type Slot = (String, String);

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    version: u64,
    read: super::ReadPermission,
    write: super::WritePermission,
}

#[derive(Debug, Default)]
struct Inner {
    namespaces: BTreeMap<String, BTreeMap<Slot, Entry>>,
    next_version: u64,
}

/// In-memory storage backend (default)
///
/// Objects are lost on restart. Listing is ordered by (kind, owner) within a
/// namespace and the cursor is the last key returned, so pages stay stable
/// while other keys are inserted or removed.
/// Thread-safe via RwLock.
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    inner: RwLock<Inner>,
}

impl InMemoryStorage {
    /// Create a new in-memory storage
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of objects across all namespaces
    pub fn len(&self) -> usize {
        self.inner
            .read()
            .map(|i| i.namespaces.values().map(|n| n.len()).sum())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of objects in one namespace
    pub fn namespace_len(&self, namespace: &str) -> usize {
        self.inner
            .read()
            .map(|i| i.namespaces.get(namespace).map_or(0, |n| n.len()))
            .unwrap_or(0)
    }

    /// Remove every object
    pub fn clear(&self) {
        if let Ok(mut inner) = self.inner.write() {
            inner.namespaces.clear();
        }
    }

    fn to_object(namespace: &str, slot: &Slot, entry: &Entry) -> StoredObject {
        StoredObject {
            key: ObjectKey::new(namespace, slot.0.clone(), slot.1.clone()),
            value: entry.value.clone(),
            version: format_version(entry.version),
            read: entry.read,
            write: entry.write,
        }
    }
}

fn format_version(version: u64) -> String {
    format!("{:016x}", version)
}

fn slot(key: &ObjectKey) -> Slot {
    (key.kind.clone(), key.owner_id.clone())
}

#[async_trait]
impl StorageBackend for InMemoryStorage {
    async fn read(&self, key: &ObjectKey) -> Result<Option<StoredObject>> {
        let inner = self.inner.read().map_err(|_| RegistryError::StorageLocked)?;
        let slot = slot(key);
        Ok(inner
            .namespaces
            .get(&key.namespace)
            .and_then(|ns| ns.get(&slot))
            .map(|entry| Self::to_object(&key.namespace, &slot, entry)))
    }

    async fn write(&self, write: StorageWrite, condition: WriteCondition) -> Result<String> {
        let mut inner = self.inner.write().map_err(|_| RegistryError::StorageLocked)?;
        let slot = slot(&write.key);

        if let WriteCondition::IfVersion(expected) = &condition {
            let current = inner
                .namespaces
                .get(&write.key.namespace)
                .and_then(|ns| ns.get(&slot))
                .map(|entry| format_version(entry.version));
            if current.as_deref() != Some(expected.as_str()) {
                return Err(RegistryError::VersionConflict {
                    namespace: write.key.namespace,
                    owner_id: write.key.owner_id,
                });
            }
        }

        inner.next_version += 1;
        let version = inner.next_version;
        inner
            .namespaces
            .entry(write.key.namespace)
            .or_default()
            .insert(
                slot,
                Entry {
                    value: write.value,
                    version,
                    read: write.read,
                    write: write.write,
                },
            );
        Ok(format_version(version))
    }

    async fn delete(&self, key: &ObjectKey, condition: WriteCondition) -> Result<()> {
        let mut inner = self.inner.write().map_err(|_| RegistryError::StorageLocked)?;
        let slot = slot(key);
        let emptied = match inner.namespaces.get_mut(&key.namespace) {
            Some(ns) => {
                let stale = match (&condition, ns.get(&slot)) {
                    (WriteCondition::IfVersion(expected), Some(entry)) => {
                        format_version(entry.version) != *expected
                    }
                    _ => false,
                };
                if stale {
                    return Err(RegistryError::VersionConflict {
                        namespace: key.namespace.clone(),
                        owner_id: key.owner_id.clone(),
                    });
                }
                ns.remove(&slot);
                ns.is_empty()
            }
            None => false,
        };
        if emptied {
            inner.namespaces.remove(&key.namespace);
        }
        Ok(())
    }

    async fn list(&self, namespace: &str, limit: usize, cursor: Option<&str>) -> Result<ListPage> {
        if limit == 0 {
            return Err(RegistryError::MalformedRequest {
                reason: "list limit must be positive".to_string(),
            });
        }

        let start = match cursor.filter(|c| !c.is_empty()) {
            Some(c) => Bound::Excluded(decode_cursor(c).ok_or_else(|| {
                RegistryError::MalformedRequest {
                    reason: format!("invalid list cursor '{}'", c),
                }
            })?),
            None => Bound::Unbounded,
        };

        let inner = self.inner.read().map_err(|_| RegistryError::StorageLocked)?;
        let Some(ns) = inner.namespaces.get(namespace) else {
            return Ok(ListPage::default());
        };

        let mut iter = ns.range((start, Bound::Unbounded));
        let objects: Vec<StoredObject> = iter
            .by_ref()
            .take(limit)
            .map(|(slot, entry)| Self::to_object(namespace, slot, entry))
            .collect();

        let cursor = match (iter.next(), objects.last()) {
            (Some(_), Some(last)) => Some(encode_cursor(&last.key.kind, &last.key.owner_id)),
            _ => None,
        };

        Ok(ListPage { objects, cursor })
    }

    async fn health_check(&self) -> Result<()> {
        let _inner = self.inner.read().map_err(|_| RegistryError::StorageLocked)?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "in-memory"
    }
}
