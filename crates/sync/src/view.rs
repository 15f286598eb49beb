use clinic_core::StatusBearing;
use std::collections::HashMap;
use uuid::Uuid;

/// A provisional change awaiting the server's answer.
#[derive(Clone, Debug)]
pub(crate) struct PendingPatch<E> {
    pub(crate) id: Uuid,
    /// The entity as it was before the patch; `None` if it was not in the view.
    pub(crate) previous: Option<E>,
}

/// One client's copy of a watched collection.
///
/// `epoch` increases on every local change so snapshots requested earlier can be recognised
/// as outdated.
#[derive(Clone, Debug)]
pub struct LocalView<E> {
    pub(crate) items: Vec<E>,
    pub(crate) epoch: u64,
    pub(crate) pending: HashMap<u64, PendingPatch<E>>,
    pub(crate) next_token: u64,
    pub(crate) closed: bool,
    pub(crate) loaded: bool,
}

impl<E> Default for LocalView<E> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            epoch: 0,
            pending: HashMap::new(),
            next_token: 0,
            closed: false,
            loaded: false,
        }
    }
}

impl<E: StatusBearing> LocalView<E> {
    pub fn items(&self) -> &[E] {
        &self.items
    }

    pub fn get(&self, id: Uuid) -> Option<&E> {
        self.items.iter().find(|e| e.id() == id)
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn pending_patches(&self) -> usize {
        self.pending.len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// True once a snapshot has been applied.
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Replaces or appends `entity`, returning what it replaced.
    pub(crate) fn upsert(&mut self, entity: E) -> Option<E> {
        match self.items.iter_mut().find(|e| e.id() == entity.id()) {
            Some(slot) => Some(std::mem::replace(slot, entity)),
            None => {
                self.items.push(entity);
                None
            }
        }
    }

    pub(crate) fn remove(&mut self, id: Uuid) -> Option<E> {
        let index = self.items.iter().position(|e| e.id() == id)?;
        Some(self.items.remove(index))
    }
}
