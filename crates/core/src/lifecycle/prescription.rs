//! Prescription rollup lifecycle.
//!
//! All prescription lines on a medical record share one `prescription_status`. The record is
//! dispensed or cancelled as a unit, once.

use super::{Collection, EntityMeta, Lifecycle, StatusBearing, TransitionAction};
use crate::error::{TransitionError, TransitionResult};
use crate::permissions::{Actor, Capability};
use chrono::{DateTime, Utc};
use clinic_types::NonEmptyText;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrescriptionStatus {
    Pending,
    Dispensed,
    Cancelled,
}

impl Lifecycle for PrescriptionStatus {
    const TRANSITIONS: &'static [(Self, Self)] = &[
        (PrescriptionStatus::Pending, PrescriptionStatus::Dispensed),
        (PrescriptionStatus::Pending, PrescriptionStatus::Cancelled),
    ];

    fn as_str(self) -> &'static str {
        match self {
            PrescriptionStatus::Pending => "pending",
            PrescriptionStatus::Dispensed => "dispensed",
            PrescriptionStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for PrescriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrescriptionLine {
    pub medicine_name: NonEmptyText,
    pub dosage: NonEmptyText,
    pub frequency: NonEmptyText,
    pub duration: NonEmptyText,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

/// Composite identity of a prescription line: its record plus its position.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PrescriptionRef {
    pub medical_record_id: Uuid,
    pub index: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PrescriptionAction {
    Dispense,
    Cancel,
}

impl TransitionAction for PrescriptionAction {
    type Status = PrescriptionStatus;

    fn target(&self) -> PrescriptionStatus {
        match self {
            PrescriptionAction::Dispense => PrescriptionStatus::Dispensed,
            PrescriptionAction::Cancel => PrescriptionStatus::Cancelled,
        }
    }

    fn capability(&self) -> Capability {
        match self {
            PrescriptionAction::Dispense => Capability::DispensePrescription,
            PrescriptionAction::Cancel => Capability::CancelPrescription,
        }
    }

    // Medicines leave the pharmacy at most once.
    fn is_single_shot(&self) -> bool {
        matches!(self, PrescriptionAction::Dispense)
    }
}

/// Input for recording a consultation together with its prescriptions.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMedicalRecord {
    pub patient_id: Uuid,
    #[serde(default)]
    pub diagnosis: Option<String>,
    #[serde(default)]
    pub prescriptions: Vec<PrescriptionLine>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MedicalRecord {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnosis: Option<String>,
    pub prescriptions: Vec<PrescriptionLine>,
    pub prescription_status: PrescriptionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dispensed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dispensed_by: Option<String>,
    #[serde(flatten)]
    pub meta: EntityMeta,
}

impl MedicalRecord {
    /// Creates the record and all of its prescription lines in one step.
    pub fn new(input: NewMedicalRecord, doctor: &Actor, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            patient_id: input.patient_id,
            doctor_id: doctor.id().to_string(),
            diagnosis: input.diagnosis.filter(|d| !d.trim().is_empty()),
            prescriptions: input.prescriptions,
            prescription_status: PrescriptionStatus::Pending,
            dispensed_at: None,
            dispensed_by: None,
            meta: EntityMeta::new(now),
        }
    }

    pub fn prescription(&self, index: usize) -> Option<&PrescriptionLine> {
        self.prescriptions.get(index)
    }

    pub fn prescription_refs(&self) -> impl Iterator<Item = PrescriptionRef> + '_ {
        (0..self.prescriptions.len()).map(|index| PrescriptionRef {
            medical_record_id: self.id,
            index,
        })
    }
}

impl StatusBearing for MedicalRecord {
    type Status = PrescriptionStatus;
    type Action = PrescriptionAction;

    const COLLECTION: Collection = Collection::MedicalRecords;

    fn id(&self) -> Uuid {
        self.id
    }

    fn patient_id(&self) -> Uuid {
        self.patient_id
    }

    fn status(&self) -> PrescriptionStatus {
        self.prescription_status
    }

    fn meta(&self) -> &EntityMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut EntityMeta {
        &mut self.meta
    }

    fn validate(&self, action: &PrescriptionAction) -> TransitionResult<()> {
        if *action == PrescriptionAction::Dispense && self.prescriptions.is_empty() {
            return Err(TransitionError::ValidationFailed(
                "medical record has no prescriptions to dispense".into(),
            ));
        }
        Ok(())
    }

    fn apply(&mut self, action: PrescriptionAction, actor: &Actor, at: DateTime<Utc>) {
        self.prescription_status = action.target();
        if action == PrescriptionAction::Dispense {
            self.dispensed_at = Some(at);
            self.dispensed_by = Some(actor.id().to_string());
        }
    }
}
