use crate::error::SyncResult;
use clinic_core::{invalidation_scope, Collection, ListFilter};
use moka::future::Cache as MokaCache;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

const MAX_ENTRIES: u64 = 1_024;

/// Read-through TTL cache of collection snapshots, keyed by collection and query.
///
/// Each collection carries a generation number that is part of every key. Invalidation bumps
/// it, so a fetch that started before a mutation can never repopulate the cache with its
/// pre-mutation result.
#[derive(Clone)]
pub struct ReadCache {
    inner: MokaCache<String, serde_json::Value>,
    generations: Arc<[AtomicU64; 3]>,
}

fn slot(collection: Collection) -> usize {
    match collection {
        Collection::LabOrders => 0,
        Collection::MedicalRecords => 1,
        Collection::Bills => 2,
    }
}

impl ReadCache {
    pub fn new(ttl: Duration) -> Self {
        let inner = MokaCache::builder()
            .max_capacity(MAX_ENTRIES)
            .time_to_live(ttl)
            .support_invalidation_closures()
            .build();
        Self {
            inner,
            generations: Arc::new([AtomicU64::new(0), AtomicU64::new(0), AtomicU64::new(0)]),
        }
    }

    fn generation(&self, collection: Collection) -> u64 {
        self.generations[slot(collection)].load(Ordering::SeqCst)
    }

    fn key(collection: Collection, generation: u64, filter: &ListFilter) -> String {
        format!("{collection}#{generation}?{}", filter.query_string())
    }

    /// Returns the cached snapshot, or runs `fetch` and caches its result.
    pub async fn get_or_fetch<E, F, Fut>(
        &self,
        collection: Collection,
        filter: &ListFilter,
        fetch: F,
    ) -> SyncResult<Vec<E>>
    where
        E: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = SyncResult<Vec<E>>>,
    {
        let key = Self::key(collection, self.generation(collection), filter);
        if let Some(value) = self.inner.get(&key).await {
            match serde_json::from_value(value) {
                Ok(items) => {
                    tracing::trace!(%key, "read cache hit");
                    return Ok(items);
                }
                Err(e) => tracing::warn!(%key, "dropping undecodable cache entry: {e}"),
            }
        }

        let items = fetch().await?;
        self.inner.insert(key, serde_json::to_value(&items)?).await;
        Ok(items)
    }

    /// Drops every cached read that a mutation on `collection` made stale.
    pub fn invalidate(&self, collection: Collection) {
        for &affected in invalidation_scope(collection) {
            let previous = self.generations[slot(affected)].fetch_add(1, Ordering::SeqCst);
            let prefix = format!("{affected}#{previous}?");
            if let Err(e) = self
                .inner
                .invalidate_entries_if(move |key, _| key.starts_with(&prefix))
            {
                tracing::warn!("cache invalidation predicate rejected: {e}");
            }
            tracing::debug!(collection = %affected, "read cache invalidated");
        }
    }
}

impl std::fmt::Debug for ReadCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadCache")
            .field("entries", &self.inner.entry_count())
            .finish()
    }
}
