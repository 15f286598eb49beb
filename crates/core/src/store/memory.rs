use super::{stored_version, EntityStore, StoreError, StoreResult};
use crate::lifecycle::Collection;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Process-local store. A single lock serialises every write.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    rows: Mutex<HashMap<(Collection, Uuid), Value>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EntityStore for InMemoryStore {
    async fn fetch(&self, collection: Collection, id: Uuid) -> StoreResult<Option<Value>> {
        let rows = self.rows.lock().await;
        Ok(rows.get(&(collection, id)).cloned())
    }

    async fn list(&self, collection: Collection) -> StoreResult<Vec<Value>> {
        let rows = self.rows.lock().await;
        Ok(rows
            .iter()
            .filter(|((c, _), _)| *c == collection)
            .map(|(_, v)| v.clone())
            .collect())
    }

    async fn insert(&self, collection: Collection, id: Uuid, value: Value) -> StoreResult<()> {
        stored_version(id, &value)?;
        let mut rows = self.rows.lock().await;
        if rows.contains_key(&(collection, id)) {
            return Err(StoreError::AlreadyExists(id));
        }
        rows.insert((collection, id), value);
        Ok(())
    }

    async fn compare_and_swap(
        &self,
        collection: Collection,
        id: Uuid,
        expected_version: u64,
        value: Value,
    ) -> StoreResult<bool> {
        let mut rows = self.rows.lock().await;
        let Some(current) = rows.get_mut(&(collection, id)) else {
            return Ok(false);
        };
        if stored_version(id, current)? != expected_version {
            return Ok(false);
        }
        *current = value;
        Ok(true)
    }

    async fn delete(&self, collection: Collection, id: Uuid) -> StoreResult<bool> {
        let mut rows = self.rows.lock().await;
        Ok(rows.remove(&(collection, id)).is_some())
    }
}
