//! Cross-entity rules.
//!
//! The three state machines are coupled loosely on purpose:
//! - dispensing a prescription never touches a bill for the same encounter, even when a bill
//!   item references the dispensed medicine;
//! - completing or cancelling a lab order never touches a bill;
//! - cancelling a bill never touches lab orders or prescriptions.
//!
//! Consequently a mutation only makes cached reads of its own collection stale, and any
//! combined view of a patient is a read-only projection over independent snapshots.

use crate::lifecycle::{
    Bill, BillStatus, Collection, LabOrder, Lifecycle, MedicalRecord, PrescriptionStatus,
    StatusBearing,
};
use clinic_types::Money;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Collections whose cached reads a successful mutation on `collection` invalidates.
pub fn invalidation_scope(collection: Collection) -> &'static [Collection] {
    match collection {
        Collection::LabOrders => &[Collection::LabOrders],
        Collection::MedicalRecords => &[Collection::MedicalRecords],
        Collection::Bills => &[Collection::Bills],
    }
}

/// Outstanding work for one patient across the three lifecycles.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientWorkload {
    pub patient_id: Uuid,
    pub open_lab_orders: Vec<Uuid>,
    pub pending_prescriptions: Vec<Uuid>,
    pub unpaid_bills: Vec<Uuid>,
    pub amount_due: Money,
}

impl PatientWorkload {
    /// Projects the snapshots; entities of other patients are ignored.
    pub fn summarise(
        patient_id: Uuid,
        lab_orders: &[LabOrder],
        records: &[MedicalRecord],
        bills: &[Bill],
    ) -> Self {
        let open_lab_orders = lab_orders
            .iter()
            .filter(|o| o.patient_id == patient_id && !o.status().is_terminal())
            .map(|o| o.id)
            .collect();

        let pending_prescriptions = records
            .iter()
            .filter(|r| {
                r.patient_id == patient_id
                    && r.prescription_status == PrescriptionStatus::Pending
                    && !r.prescriptions.is_empty()
            })
            .map(|r| r.id)
            .collect();

        let unpaid: Vec<&Bill> = bills
            .iter()
            .filter(|b| {
                b.patient_id == patient_id
                    && matches!(b.status, BillStatus::Pending | BillStatus::PartiallyPaid)
            })
            .collect();
        let amount_due = unpaid
            .iter()
            .map(|b| b.outstanding())
            .try_fold(Money::ZERO, |acc, m| acc.checked_add(m))
            .unwrap_or(Money::ZERO);

        Self {
            patient_id,
            open_lab_orders,
            pending_prescriptions,
            unpaid_bills: unpaid.iter().map(|b| b.id).collect(),
            amount_due,
        }
    }
}
