use crate::error::SyncResult;
use async_trait::async_trait;
use clinic_core::lifecycle::Bill;
use clinic_core::{Actor, ListFilter, StatusBearing, TransitionExecutor};
use uuid::Uuid;

/// Where a client reads snapshots from and sends transitions to.
///
/// A source acts on behalf of one actor.
#[async_trait]
pub trait CollectionSource<E: StatusBearing>: Send + Sync {
    fn actor(&self) -> &Actor;

    /// Full snapshot of the collection matching `filter`.
    async fn snapshot(&self, filter: &ListFilter) -> SyncResult<Vec<E>>;

    /// Authoritative copy of one entity.
    async fn fetch(&self, id: Uuid) -> SyncResult<E>;

    /// Requests a transition through the executor.
    async fn transition(&self, id: Uuid, expected: E::Status, action: E::Action)
        -> SyncResult<E>;
}

/// Bills are the only entity with a delete path.
#[async_trait]
pub trait BillSource: CollectionSource<Bill> {
    async fn delete_bill(&self, id: Uuid) -> SyncResult<()>;
}

/// Talks to an executor in the same process.
#[derive(Clone, Debug)]
pub struct LocalSource {
    executor: TransitionExecutor,
    actor: Actor,
}

impl LocalSource {
    pub fn new(executor: TransitionExecutor, actor: Actor) -> Self {
        Self { executor, actor }
    }
}

#[async_trait]
impl<E: StatusBearing> CollectionSource<E> for LocalSource {
    fn actor(&self) -> &Actor {
        &self.actor
    }

    async fn snapshot(&self, filter: &ListFilter) -> SyncResult<Vec<E>> {
        Ok(self.executor.list::<E>(filter).await?)
    }

    async fn fetch(&self, id: Uuid) -> SyncResult<E> {
        Ok(self.executor.get::<E>(id).await?)
    }

    async fn transition(
        &self,
        id: Uuid,
        expected: E::Status,
        action: E::Action,
    ) -> SyncResult<E> {
        Ok(self
            .executor
            .transition::<E>(&self.actor, id, expected, action)
            .await?)
    }
}

#[async_trait]
impl BillSource for LocalSource {
    async fn delete_bill(&self, id: Uuid) -> SyncResult<()> {
        Ok(self.executor.delete_bill(&self.actor, id).await?)
    }
}
