//! JSON file store.
//!
//! Each entity lives in its own file under a sharded directory derived from its UUID:
//!
//! `<root>/<collection>/<u[0..2]>/<u[2..4]>/<u>.json`
//!
//! where `u` is the 32-character lowercase hex form of the id. Sharding keeps any one
//! directory small. Files are replaced by writing a sibling temp file and renaming it over the
//! original, so readers never observe a half-written entity.

use super::{stored_version, EntityStore, StoreError, StoreResult};
use crate::constants::RECORD_FILE_EXTENSION;
use crate::lifecycle::Collection;
use async_trait::async_trait;
use serde_json::Value;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Debug)]
pub struct JsonFileStore {
    root: PathBuf,
    // Serialises read-compare-write sequences.
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    /// Opens (and creates if needed) a store rooted at `root`.
    pub async fn open(root: impl AsRef<Path>) -> StoreResult<Self> {
        let root = root.as_ref().to_path_buf();
        for collection in Collection::ALL {
            fs::create_dir_all(root.join(collection.as_str())).await?;
        }
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    fn entity_path(&self, collection: Collection, id: Uuid) -> PathBuf {
        let hex = id.simple().to_string();
        self.root
            .join(collection.as_str())
            .join(&hex[0..2])
            .join(&hex[2..4])
            .join(format!("{hex}.{RECORD_FILE_EXTENSION}"))
    }

    async fn read_entity(path: &Path) -> StoreResult<Option<Value>> {
        match fs::read(path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    async fn write_entity(path: &Path, value: &Value) -> StoreResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(value)?).await?;
        fs::rename(&tmp, path).await?;
        Ok(())
    }

    async fn subdirs(dir: &Path) -> StoreResult<Vec<PathBuf>> {
        let mut out = Vec::new();
        let mut entries = match fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(out),
            Err(e) => return Err(StoreError::Io(e)),
        };
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                out.push(entry.path());
            }
        }
        Ok(out)
    }
}

#[async_trait]
impl EntityStore for JsonFileStore {
    async fn fetch(&self, collection: Collection, id: Uuid) -> StoreResult<Option<Value>> {
        Self::read_entity(&self.entity_path(collection, id)).await
    }

    async fn list(&self, collection: Collection) -> StoreResult<Vec<Value>> {
        let mut values = Vec::new();
        for s1 in Self::subdirs(&self.root.join(collection.as_str())).await? {
            for s2 in Self::subdirs(&s1).await? {
                let mut entries = fs::read_dir(&s2).await?;
                while let Some(entry) = entries.next_entry().await? {
                    let path = entry.path();
                    if path.extension().and_then(|e| e.to_str()) != Some(RECORD_FILE_EXTENSION) {
                        continue;
                    }
                    match Self::read_entity(&path).await {
                        Ok(Some(value)) => values.push(value),
                        Ok(None) => {}
                        Err(e) => {
                            tracing::warn!("skipping unreadable entity {}: {e}", path.display());
                        }
                    }
                }
            }
        }
        Ok(values)
    }

    async fn insert(&self, collection: Collection, id: Uuid, value: Value) -> StoreResult<()> {
        stored_version(id, &value)?;
        let _guard = self.write_lock.lock().await;
        let path = self.entity_path(collection, id);
        if fs::try_exists(&path).await? {
            return Err(StoreError::AlreadyExists(id));
        }
        Self::write_entity(&path, &value).await
    }

    async fn compare_and_swap(
        &self,
        collection: Collection,
        id: Uuid,
        expected_version: u64,
        value: Value,
    ) -> StoreResult<bool> {
        let _guard = self.write_lock.lock().await;
        let path = self.entity_path(collection, id);
        let Some(current) = Self::read_entity(&path).await? else {
            return Ok(false);
        };
        if stored_version(id, &current)? != expected_version {
            return Ok(false);
        }
        Self::write_entity(&path, &value).await?;
        Ok(true)
    }

    async fn delete(&self, collection: Collection, id: Uuid) -> StoreResult<bool> {
        let _guard = self.write_lock.lock().await;
        match fs::remove_file(self.entity_path(collection, id)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StoreError::Io(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn entities_land_in_sharded_paths() {
        let temp = TempDir::new().unwrap();
        let store = JsonFileStore::open(temp.path()).await.unwrap();
        let id = Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap();

        store
            .insert(Collection::LabOrders, id, json!({"version": 1}))
            .await
            .unwrap();

        let expected = temp
            .path()
            .join("lab_orders/55/0e/550e8400e29b41d4a716446655440000.json");
        assert!(expected.is_file());
    }

    #[tokio::test]
    async fn data_survives_reopen() {
        let temp = TempDir::new().unwrap();
        let id = Uuid::new_v4();
        {
            let store = JsonFileStore::open(temp.path()).await.unwrap();
            store
                .insert(Collection::Bills, id, json!({"version": 1, "status": "pending"}))
                .await
                .unwrap();
            assert!(store
                .compare_and_swap(Collection::Bills, id, 1, json!({"version": 2, "status": "paid"}))
                .await
                .unwrap());
        }

        let reopened = JsonFileStore::open(temp.path()).await.unwrap();
        let row = reopened.fetch(Collection::Bills, id).await.unwrap().unwrap();
        assert_eq!(row["status"], "paid");
        assert_eq!(reopened.list(Collection::Bills).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn stale_version_does_not_overwrite() {
        let temp = TempDir::new().unwrap();
        let store = JsonFileStore::open(temp.path()).await.unwrap();
        let id = Uuid::new_v4();
        store
            .insert(Collection::MedicalRecords, id, json!({"version": 3}))
            .await
            .unwrap();
        assert!(!store
            .compare_and_swap(Collection::MedicalRecords, id, 2, json!({"version": 3}))
            .await
            .unwrap());
        assert!(!store
            .compare_and_swap(Collection::MedicalRecords, Uuid::new_v4(), 1, json!({"version": 2}))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn delete_removes_file() {
        let temp = TempDir::new().unwrap();
        let store = JsonFileStore::open(temp.path()).await.unwrap();
        let id = Uuid::new_v4();
        store
            .insert(Collection::Bills, id, json!({"version": 1}))
            .await
            .unwrap();
        assert!(store.delete(Collection::Bills, id).await.unwrap());
        assert!(!store.delete(Collection::Bills, id).await.unwrap());
        assert!(store.list(Collection::Bills).await.unwrap().is_empty());
    }
}
