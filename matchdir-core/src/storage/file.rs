//! File-based storage backend (one JSON document per key)

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::{
    decode_cursor, encode_cursor, ListPage, ObjectKey, ReadPermission, StorageBackend,
    StorageWrite, StoredObject, WriteCondition, WritePermission,
};
use crate::error::{RegistryError, Result};

const BACKEND: &str = "file";

/// On-disk document
#[derive(Debug, Serialize, Deserialize)]
struct FileObject {
    version: String,
    read: ReadPermission,
    write: WritePermission,
    value: String,
}

/// File-based storage backend
///
/// Layout: `<root>/<hex(namespace)>/<hex(kind)>.<hex(owner)>.json`. Names are
/// hex encoded so arbitrary ids are safe on any filesystem, and the file stem
/// doubles as the list cursor.
///
/// Version tokens are random 128-bit values rather than per-file counters:
/// a deleted and recreated key must never hand out a token an in-flight
/// conditional write could still be holding.
/// Suitable for development and single-node deployments.
#[derive(Debug)]
pub struct FileStorage {
    directory: PathBuf,
    /// Serializes writers so conditional writes are atomic within a process
    write_lock: Mutex<()>,
}

impl FileStorage {
    /// Create a new file storage in the given directory
    pub fn new<P: Into<PathBuf>>(directory: P) -> Result<Self> {
        let dir = directory.into();
        std::fs::create_dir_all(&dir).map_err(|e| {
            RegistryError::storage(BACKEND, format!("failed to create {}: {}", dir.display(), e))
        })?;
        Ok(Self {
            directory: dir,
            write_lock: Mutex::new(()),
        })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn namespace_dir(&self, namespace: &str) -> PathBuf {
        self.directory.join(hex::encode(namespace))
    }

    fn object_path(&self, key: &ObjectKey) -> PathBuf {
        self.namespace_dir(&key.namespace)
            .join(format!("{}.json", encode_cursor(&key.kind, &key.owner_id)))
    }

    async fn load(&self, path: &Path) -> Result<Option<FileObject>> {
        match tokio::fs::read(path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map(Some).map_err(|e| {
                RegistryError::storage(BACKEND, format!("unreadable {}: {}", path.display(), e))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(RegistryError::storage(BACKEND, e)),
        }
    }

    fn to_object(key: ObjectKey, doc: FileObject) -> StoredObject {
        StoredObject {
            key,
            value: doc.value,
            version: doc.version,
            read: doc.read,
            write: doc.write,
        }
    }
}

fn new_version() -> String {
    format!("{:032x}", rand::random::<u128>())
}

#[async_trait]
impl StorageBackend for FileStorage {
    async fn read(&self, key: &ObjectKey) -> Result<Option<StoredObject>> {
        let doc = self.load(&self.object_path(key)).await?;
        Ok(doc.map(|doc| Self::to_object(key.clone(), doc)))
    }

    async fn write(&self, write: StorageWrite, condition: WriteCondition) -> Result<String> {
        let _guard = self.write_lock.lock().await;

        let path = self.object_path(&write.key);
        let current = self.load(&path).await?;

        if let WriteCondition::IfVersion(expected) = &condition {
            let matches = current
                .as_ref()
                .map_or(false, |doc| doc.version == *expected);
            if !matches {
                return Err(RegistryError::VersionConflict {
                    namespace: write.key.namespace,
                    owner_id: write.key.owner_id,
                });
            }
        }

        let doc = FileObject {
            version: new_version(),
            read: write.read,
            write: write.write,
            value: write.value,
        };

        tokio::fs::create_dir_all(self.namespace_dir(&write.key.namespace))
            .await
            .map_err(|e| RegistryError::storage(BACKEND, e))?;

        // write-then-rename so readers never observe a torn document
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_vec(&doc)?)
            .await
            .map_err(|e| RegistryError::storage(BACKEND, e))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| RegistryError::storage(BACKEND, e))?;

        Ok(doc.version)
    }

    async fn delete(&self, key: &ObjectKey, condition: WriteCondition) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let path = self.object_path(key);

        if let WriteCondition::IfVersion(expected) = &condition {
            match self.load(&path).await? {
                Some(doc) if doc.version != *expected => {
                    return Err(RegistryError::VersionConflict {
                        namespace: key.namespace.clone(),
                        owner_id: key.owner_id.clone(),
                    });
                }
                Some(_) => {}
                None => return Ok(()),
            }
        }

        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(RegistryError::storage(BACKEND, e)),
        }
    }

    async fn list(&self, namespace: &str, limit: usize, cursor: Option<&str>) -> Result<ListPage> {
        if limit == 0 {
            return Err(RegistryError::MalformedRequest {
                reason: "list limit must be positive".to_string(),
            });
        }
        let after = cursor.filter(|c| !c.is_empty());
        if let Some(c) = after {
            if decode_cursor(c).is_none() {
                return Err(RegistryError::MalformedRequest {
                    reason: format!("invalid list cursor '{}'", c),
                });
            }
        }

        let dir = self.namespace_dir(namespace);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(ListPage::default()),
            Err(e) => return Err(RegistryError::storage(BACKEND, e)),
        };

        let mut stems = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| RegistryError::storage(BACKEND, e))?
        {
            let name = entry.file_name();
            let Some(stem) = name.to_str().and_then(|n| n.strip_suffix(".json")) else {
                continue;
            };
            if decode_cursor(stem).is_none() {
                continue;
            }
            if after.map_or(true, |c| stem > c) {
                stems.push(stem.to_string());
            }
        }
        stems.sort();

        let more = stems.len() > limit;
        stems.truncate(limit);

        let mut objects = Vec::with_capacity(stems.len());
        for stem in &stems {
            let Some((kind, owner)) = decode_cursor(stem) else {
                continue;
            };
            // a concurrent delete between read_dir and load just drops the entry
            if let Some(doc) = self.load(&dir.join(format!("{}.json", stem))).await? {
                objects.push(Self::to_object(ObjectKey::new(namespace, kind, owner), doc));
            }
        }

        let cursor = if more { stems.last().cloned() } else { None };
        Ok(ListPage { objects, cursor })
    }

    async fn health_check(&self) -> Result<()> {
        if self.directory.is_dir() {
            Ok(())
        } else {
            Err(RegistryError::storage(
                BACKEND,
                format!("directory {} does not exist", self.directory.display()),
            ))
        }
    }

    fn name(&self) -> &'static str {
        BACKEND
    }
}
