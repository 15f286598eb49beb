//! Status models for the three status-bearing entities.
//!
//! Each entity owns a closed status enum with a static transition table. The tables are the
//! only source of legality: [`Lifecycle::can_transition`], [`Lifecycle::allowed_targets`] and
//! [`Lifecycle::is_terminal`] are all derived from them.

pub mod bill;
pub mod lab_order;
pub mod prescription;

use crate::error::TransitionResult;
use crate::permissions::{Actor, Capability, Role};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

pub use bill::{Bill, BillAction, BillItem, BillStatus, NewBill, NewBillItem};
pub use lab_order::{
    LabOrder, LabOrderAction, LabOrderStatus, LabParameter, LabPriority, LabResult,
    LabResultPayload, NewLabOrder,
};
pub use prescription::{
    MedicalRecord, NewMedicalRecord, PrescriptionAction, PrescriptionLine, PrescriptionRef,
    PrescriptionStatus,
};

/// A closed set of states with a static transition table.
pub trait Lifecycle:
    Copy + Eq + fmt::Debug + fmt::Display + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Every legal `(from, to)` edge.
    const TRANSITIONS: &'static [(Self, Self)];

    /// Wire name of the state.
    fn as_str(self) -> &'static str;

    fn can_transition(self, to: Self) -> bool {
        Self::TRANSITIONS
            .iter()
            .any(|&(from, next)| from == self && next == to)
    }

    fn allowed_targets(self) -> Vec<Self> {
        Self::TRANSITIONS
            .iter()
            .filter(|(from, _)| *from == self)
            .map(|&(_, to)| to)
            .collect()
    }

    fn is_terminal(self) -> bool {
        !Self::TRANSITIONS.iter().any(|(from, _)| *from == self)
    }
}

/// A requested transition together with its payload.
pub trait TransitionAction: Clone + fmt::Debug + Send + Sync + 'static {
    type Status: Lifecycle;

    /// The state this action moves the entity into.
    fn target(&self) -> Self::Status;

    /// Capability the requesting actor must hold.
    fn capability(&self) -> Capability;

    /// Single-shot actions reject a repeat instead of treating it as a no-op.
    fn is_single_shot(&self) -> bool {
        false
    }
}

/// The three status-bearing collections.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    LabOrders,
    MedicalRecords,
    Bills,
}

impl Collection {
    pub const ALL: [Collection; 3] = [
        Collection::LabOrders,
        Collection::MedicalRecords,
        Collection::Bills,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Collection::LabOrders => "lab_orders",
            Collection::MedicalRecords => "medical_records",
            Collection::Bills => "bills",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Collection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Collection::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("unknown collection: {s}"))
    }
}

/// One accepted status change.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub from: String,
    pub to: String,
    pub actor_id: String,
    pub actor_role: Role,
    pub at: DateTime<Utc>,
}

/// Bookkeeping carried by every stored entity.
///
/// `version` starts at 1 and is bumped on every accepted state change; the store compares it
/// before replacing a row.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityMeta {
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub history: Vec<TransitionRecord>,
}

impl EntityMeta {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            version: 1,
            created_at: now,
            updated_at: now,
            history: Vec::new(),
        }
    }

    pub(crate) fn record(&mut self, record: TransitionRecord) {
        self.version += 1;
        self.updated_at = record.at;
        self.history.push(record);
    }
}

/// An entity governed by a [`Lifecycle`].
pub trait StatusBearing:
    Clone + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    type Status: Lifecycle;
    type Action: TransitionAction<Status = Self::Status>;

    const COLLECTION: Collection;

    fn id(&self) -> Uuid;

    fn patient_id(&self) -> Uuid;

    fn status(&self) -> Self::Status;

    fn meta(&self) -> &EntityMeta;

    fn meta_mut(&mut self) -> &mut EntityMeta;

    /// Checks the action's payload against this entity. Runs before any state change.
    fn validate(&self, action: &Self::Action) -> TransitionResult<()>;

    /// Applies an already-authorised, already-validated action.
    ///
    /// Implementations set the status and any status-linked fields; version and history are
    /// handled by [`StatusBearing::commit`].
    fn apply(&mut self, action: Self::Action, actor: &Actor, at: DateTime<Utc>);

    fn version(&self) -> u64 {
        self.meta().version
    }

    /// Applies `action` and records it in the entity's history.
    fn commit(&mut self, action: Self::Action, actor: &Actor, at: DateTime<Utc>) {
        let from = self.status();
        self.apply(action, actor, at);
        let to = self.status();
        self.meta_mut().record(TransitionRecord {
            from: from.as_str().to_string(),
            to: to.as_str().to_string(),
            actor_id: actor.id().to_string(),
            actor_role: actor.role(),
            at,
        });
    }
}
