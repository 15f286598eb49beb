//! Pure reconciliation of a [`LocalView`] with server snapshots and optimistic patches.
//!
//! Rules:
//! - a snapshot replaces the view wholesale, unless the view changed after the snapshot was
//!   requested or a patch is still awaiting its answer; such a snapshot is discarded and the
//!   next poll reconciles;
//! - a staged patch is either confirmed with the server's entity or reverted to the exact
//!   pre-patch entity;
//! - nothing is applied to a closed view.

use crate::error::{SyncError, SyncResult};
use crate::view::{LocalView, PendingPatch};
use clinic_core::StatusBearing;
use uuid::Uuid;

/// Issued when a poll starts; carries the view epoch at that moment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PollTicket {
    epoch: u64,
}

/// Handle to one staged optimistic patch.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct PatchToken(u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SnapshotOutcome {
    Applied,
    /// The view changed after the ticket was issued.
    Outdated,
    Closed,
}

#[derive(Debug)]
pub struct Reconciler<E> {
    view: LocalView<E>,
}

impl<E> Default for Reconciler<E> {
    fn default() -> Self {
        Self {
            view: LocalView::default(),
        }
    }
}

impl<E: StatusBearing> Reconciler<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn view(&self) -> &LocalView<E> {
        &self.view
    }

    pub fn begin_poll(&self) -> PollTicket {
        PollTicket {
            epoch: self.view.epoch,
        }
    }

    pub fn apply_snapshot(&mut self, ticket: PollTicket, items: Vec<E>) -> SnapshotOutcome {
        if self.view.closed {
            return SnapshotOutcome::Closed;
        }
        if ticket.epoch != self.view.epoch || !self.view.pending.is_empty() {
            tracing::debug!(
                collection = %E::COLLECTION,
                ticket = ticket.epoch,
                epoch = self.view.epoch,
                "discarding outdated snapshot"
            );
            return SnapshotOutcome::Outdated;
        }
        self.view.items = items;
        self.view.loaded = true;
        SnapshotOutcome::Applied
    }

    /// Shows `provisional` in place of the current entity until confirmed or reverted.
    pub fn stage(&mut self, provisional: E) -> SyncResult<PatchToken> {
        if self.view.closed {
            return Err(SyncError::Closed);
        }
        let id = provisional.id();
        let previous = self.view.upsert(provisional);
        self.view.epoch += 1;
        let token = self.view.next_token;
        self.view.next_token += 1;
        self.view.pending.insert(token, PendingPatch { id, previous });
        Ok(PatchToken(token))
    }

    /// Replaces the provisional entity with the server's answer.
    ///
    /// Moves the epoch: a poll that began while the patch was in flight may have read the
    /// server before the change committed.
    pub fn confirm(&mut self, token: PatchToken, server: E) {
        if self.view.pending.remove(&token.0).is_some() && !self.view.closed {
            self.view.upsert(server);
            self.view.epoch += 1;
        }
    }

    /// Restores the entity as it was before the patch.
    pub fn revert(&mut self, token: PatchToken) {
        let Some(patch) = self.view.pending.remove(&token.0) else {
            return;
        };
        if self.view.closed {
            return;
        }
        match patch.previous {
            Some(previous) => {
                self.view.upsert(previous);
            }
            None => {
                self.view.remove(patch.id);
            }
        }
        self.view.epoch += 1;
    }

    /// Records an authoritative entity read outside a poll.
    pub fn replace(&mut self, entity: E) {
        if self.view.closed {
            return;
        }
        self.view.upsert(entity);
        self.view.epoch += 1;
    }

    pub fn forget(&mut self, id: Uuid) -> Option<E> {
        if self.view.closed {
            return None;
        }
        let removed = self.view.remove(id);
        self.view.epoch += 1;
        removed
    }

    /// Marks the view torn down. Results arriving afterwards are ignored.
    pub fn close(&mut self) {
        self.view.closed = true;
        self.view.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use clinic_core::lifecycle::{LabOrder, LabOrderAction, LabOrderStatus, LabPriority, NewLabOrder};
    use clinic_core::{Actor, Role, StatusBearing};
    use clinic_types::NonEmptyText;

    fn tech() -> Actor {
        Actor::new(NonEmptyText::new("tech").unwrap(), Role::LabTechnician)
    }

    fn order(name: &str) -> LabOrder {
        let doctor = Actor::new(NonEmptyText::new("dr").unwrap(), Role::Doctor);
        LabOrder::new(
            NewLabOrder {
                patient_id: Uuid::new_v4(),
                test_name: NonEmptyText::new(name).unwrap(),
                test_code: NonEmptyText::new(name).unwrap(),
                priority: LabPriority::Routine,
                notes: None,
            },
            &doctor,
            Utc::now(),
        )
    }

    fn collected(o: &LabOrder) -> LabOrder {
        let mut next = o.clone();
        next.apply(LabOrderAction::CollectSample, &tech(), Utc::now());
        next
    }

    #[test]
    fn snapshot_replaces_view() {
        let mut r = Reconciler::new();
        let ticket = r.begin_poll();
        assert_eq!(r.apply_snapshot(ticket, vec![order("CBC")]), SnapshotOutcome::Applied);
        assert_eq!(r.view().items().len(), 1);
        assert!(r.view().is_loaded());

        let ticket = r.begin_poll();
        assert_eq!(r.apply_snapshot(ticket, vec![]), SnapshotOutcome::Applied);
        assert!(r.view().items().is_empty());
    }

    #[test]
    fn snapshot_requested_before_patch_is_discarded() {
        let o = order("CBC");
        let mut r = Reconciler::new();
        let t = r.begin_poll();
        r.apply_snapshot(t, vec![o.clone()]);

        let ticket = r.begin_poll();
        let token = r.stage(collected(&o)).unwrap();
        r.confirm(token, collected(&o));

        // The poll went out before the patch and carries the old status.
        assert_eq!(
            r.apply_snapshot(ticket, vec![o.clone()]),
            SnapshotOutcome::Outdated
        );
        assert_eq!(
            r.view().get(o.id).unwrap().status,
            LabOrderStatus::SampleCollected
        );

        let ticket = r.begin_poll();
        assert_eq!(
            r.apply_snapshot(ticket, vec![collected(&o)]),
            SnapshotOutcome::Applied
        );
    }

    #[test]
    fn snapshot_waits_for_in_flight_patch() {
        let o = order("CBC");
        let mut r = Reconciler::new();
        let t = r.begin_poll();
        r.apply_snapshot(t, vec![o.clone()]);

        let token = r.stage(collected(&o)).unwrap();
        let ticket = r.begin_poll();
        assert_eq!(r.apply_snapshot(ticket, vec![o.clone()]), SnapshotOutcome::Outdated);
        r.confirm(token, collected(&o));
        assert_eq!(r.view().pending_patches(), 0);
    }

    #[test]
    fn poll_started_mid_patch_cannot_undo_confirmation() {
        let o = order("CBC");
        let mut r = Reconciler::new();
        let t = r.begin_poll();
        r.apply_snapshot(t, vec![o.clone()]);

        let token = r.stage(collected(&o)).unwrap();
        let ticket = r.begin_poll();
        r.confirm(token, collected(&o));

        assert_eq!(r.apply_snapshot(ticket, vec![o.clone()]), SnapshotOutcome::Outdated);
        assert_eq!(
            r.view().get(o.id).unwrap().status,
            LabOrderStatus::SampleCollected
        );
    }

    #[test]
    fn poll_started_mid_patch_is_discarded_after_revert() {
        let o = order("CBC");
        let mut r = Reconciler::new();
        let t = r.begin_poll();
        r.apply_snapshot(t, vec![o.clone()]);

        let token = r.stage(collected(&o)).unwrap();
        let ticket = r.begin_poll();
        r.revert(token);
        assert_eq!(r.apply_snapshot(ticket, vec![]), SnapshotOutcome::Outdated);
        assert_eq!(r.view().get(o.id), Some(&o));
    }

    #[test]
    fn revert_restores_previous_entity() {
        let o = order("CBC");
        let mut r = Reconciler::new();
        let t = r.begin_poll();
        r.apply_snapshot(t, vec![o.clone()]);

        let token = r.stage(collected(&o)).unwrap();
        assert_eq!(
            r.view().get(o.id).unwrap().status,
            LabOrderStatus::SampleCollected
        );
        r.revert(token);
        assert_eq!(r.view().get(o.id), Some(&o));
        assert_eq!(r.view().pending_patches(), 0);
    }

    #[test]
    fn revert_of_unknown_entity_removes_it() {
        let o = order("CBC");
        let mut r = Reconciler::new();
        let token = r.stage(o.clone()).unwrap();
        r.revert(token);
        assert!(r.view().get(o.id).is_none());
    }

    #[test]
    fn closed_view_ignores_everything() {
        let o = order("CBC");
        let mut r = Reconciler::new();
        let ticket = r.begin_poll();
        r.close();
        assert_eq!(r.apply_snapshot(ticket, vec![o.clone()]), SnapshotOutcome::Closed);
        assert!(matches!(r.stage(o.clone()), Err(SyncError::Closed)));
        r.replace(o);
        assert!(r.view().items().is_empty());
        assert!(r.view().is_closed());
    }
}
