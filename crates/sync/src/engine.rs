use crate::cache::ReadCache;
use crate::error::{SyncError, SyncResult};
use crate::reconciler::{Reconciler, SnapshotOutcome};
use crate::scheduler::PollScheduler;
use crate::source::{BillSource, CollectionSource};
use chrono::Utc;
use clinic_core::lifecycle::Bill;
use clinic_core::{Collection, Lifecycle, ListFilter, StatusBearing, TransitionAction};
use std::marker::PhantomData;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use uuid::Uuid;

/// Keeps one watched collection of one client in sync with the server.
pub struct SyncEngine<E, S> {
    source: Arc<S>,
    reconciler: Mutex<Reconciler<E>>,
    cache: ReadCache,
    filter: ListFilter,
    scheduler: PollScheduler,
    _entity: PhantomData<fn() -> E>,
}

impl<E, S> SyncEngine<E, S>
where
    E: StatusBearing,
    S: CollectionSource<E>,
{
    pub fn new(
        source: Arc<S>,
        cache: ReadCache,
        filter: ListFilter,
        scheduler: PollScheduler,
    ) -> Self {
        Self {
            source,
            reconciler: Mutex::new(Reconciler::new()),
            cache,
            filter,
            scheduler,
            _entity: PhantomData,
        }
    }

    pub fn filter(&self) -> &ListFilter {
        &self.filter
    }

    /// Current local copy of the collection.
    pub async fn items(&self) -> Vec<E> {
        self.reconciler.lock().await.view().items().to_vec()
    }

    pub async fn get(&self, id: Uuid) -> Option<E> {
        self.reconciler.lock().await.view().get(id).cloned()
    }

    pub async fn is_closed(&self) -> bool {
        self.reconciler.lock().await.view().is_closed()
    }

    /// One poll: read (through the cache) and reconcile.
    pub async fn poll_once(&self) -> SyncResult<SnapshotOutcome> {
        let ticket = self.reconciler.lock().await.begin_poll();
        let items = self
            .cache
            .get_or_fetch(E::COLLECTION, &self.filter, || self.source.snapshot(&self.filter))
            .await?;
        let outcome = self.reconciler.lock().await.apply_snapshot(ticket, items);
        tracing::debug!(collection = %E::COLLECTION, ?outcome, "poll finished");
        Ok(outcome)
    }

    /// Drops cached reads of the collection, then polls.
    pub async fn refresh(&self) -> SyncResult<SnapshotOutcome> {
        self.cache.invalidate(E::COLLECTION);
        self.poll_once().await
    }

    /// Requests `action` on `id`, showing the expected outcome locally until the server answers.
    ///
    /// The caller's assumed status is whatever the local view holds. On failure the local
    /// entity is restored exactly; on success it is replaced by the server's copy and cached
    /// reads of the collection are dropped.
    pub async fn perform(&self, id: Uuid, action: E::Action) -> SyncResult<E> {
        let (expected, token) = {
            let mut reconciler = self.reconciler.lock().await;
            if reconciler.view().is_closed() {
                return Err(SyncError::Closed);
            }
            let current = reconciler
                .view()
                .get(id)
                .cloned()
                .ok_or(SyncError::NotInView(id))?;
            let expected = current.status();
            let locally_plausible = expected.can_transition(action.target())
                && current.validate(&action).is_ok();
            let token = if locally_plausible {
                let mut provisional = current;
                provisional.apply(action.clone(), self.source.actor(), Utc::now());
                Some(reconciler.stage(provisional)?)
            } else {
                None
            };
            (expected, token)
        };

        let result = self.source.transition(id, expected, action).await;

        let mut reconciler = self.reconciler.lock().await;
        match result {
            Ok(entity) => {
                match token {
                    Some(token) => reconciler.confirm(token, entity.clone()),
                    None => reconciler.replace(entity.clone()),
                }
                drop(reconciler);
                self.cache.invalidate(E::COLLECTION);
                tracing::info!(
                    collection = %E::COLLECTION,
                    %id,
                    status = %entity.status(),
                    "transition confirmed"
                );
                Ok(entity)
            }
            Err(e) => {
                if let Some(token) = token {
                    reconciler.revert(token);
                }
                tracing::warn!(collection = %E::COLLECTION, %id, "transition rejected: {e}");
                Err(e)
            }
        }
    }

    /// Like [`SyncEngine::perform`], but on `StaleState` re-reads the entity and tries once more.
    pub async fn perform_with_retry(&self, id: Uuid, action: E::Action) -> SyncResult<E> {
        match self.perform(id, action.clone()).await {
            Err(e) if e.is_stale() => {
                tracing::info!(collection = %E::COLLECTION, %id, "stale view, re-reading once");
                let fresh = self.source.fetch(id).await?;
                self.reconciler.lock().await.replace(fresh);
                self.perform(id, action).await
            }
            other => other,
        }
    }

    /// Marks the view torn down; later poll results are ignored.
    pub async fn close(&self) {
        self.reconciler.lock().await.close();
    }

    /// Polls on the scheduler's interval until `shutdown`, then closes the view.
    pub async fn run(&self, shutdown: watch::Receiver<bool>) {
        self.scheduler
            .run(shutdown, move || async move {
                if let Err(e) = self.poll_once().await {
                    tracing::warn!(collection = %E::COLLECTION, "poll failed: {e}");
                }
            })
            .await;
        self.close().await;
    }
}

impl<S: BillSource> SyncEngine<Bill, S> {
    pub async fn delete_bill(&self, id: Uuid) -> SyncResult<()> {
        self.source.delete_bill(id).await?;
        self.reconciler.lock().await.forget(id);
        self.cache.invalidate(Collection::Bills);
        tracing::info!(%id, "bill deleted");
        Ok(())
    }
}
