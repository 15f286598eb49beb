//! Entity store contract.
//!
//! The authoritative store is an external collaborator. This module fixes the contract the
//! executor relies on and ships two adapters: [`InMemoryStore`] for tests and single-process
//! runs, and [`JsonFileStore`] for a sharded on-disk layout.
//!
//! Rows are JSON documents. Each carries a top-level `version` field; the store must replace a
//! row only when the stored version equals the caller's expected version, so that two
//! mutually exclusive transitions on the same entity can never both succeed.

mod file;
mod memory;

pub use file::JsonFileStore;
pub use memory::InMemoryStore;

use crate::config::ClinicConfig;
use crate::lifecycle::Collection;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to (de)serialise stored entity: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("entry {0} already exists")]
    AlreadyExists(Uuid),
    #[error("stored entity {0} has no version field")]
    MissingVersion(Uuid),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[async_trait]
pub trait EntityStore: Send + Sync + std::fmt::Debug {
    async fn fetch(&self, collection: Collection, id: Uuid) -> StoreResult<Option<Value>>;

    /// Every row of a collection, in no particular order.
    async fn list(&self, collection: Collection) -> StoreResult<Vec<Value>>;

    async fn insert(&self, collection: Collection, id: Uuid, value: Value) -> StoreResult<()>;

    /// Replaces a row if its stored version equals `expected_version`.
    ///
    /// Returns `Ok(false)` when the row is missing or another writer got there first.
    async fn compare_and_swap(
        &self,
        collection: Collection,
        id: Uuid,
        expected_version: u64,
        value: Value,
    ) -> StoreResult<bool>;

    /// Removes a row. Returns `Ok(false)` if there was nothing to remove.
    async fn delete(&self, collection: Collection, id: Uuid) -> StoreResult<bool>;
}

/// Reads the `version` field of a stored row.
pub fn stored_version(id: Uuid, value: &Value) -> StoreResult<u64> {
    value
        .get("version")
        .and_then(Value::as_u64)
        .ok_or(StoreError::MissingVersion(id))
}

/// Opens the store selected by configuration: on disk when a data directory is set, otherwise
/// in memory.
pub async fn open(cfg: &ClinicConfig) -> StoreResult<Arc<dyn EntityStore>> {
    match cfg.data_dir() {
        Some(dir) => {
            tracing::info!("using JSON file store at {}", dir.display());
            Ok(Arc::new(JsonFileStore::open(dir).await?))
        }
        None => {
            tracing::info!("using in-memory store");
            Ok(Arc::new(InMemoryStore::new()))
        }
    }
}
