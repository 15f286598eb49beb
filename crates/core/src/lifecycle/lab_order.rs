//! Lab order lifecycle.
//!
//! `ordered -> sample_collected -> in_progress -> completed`, with cancellation from any
//! non-terminal state. A result is present exactly when the order is completed.

use super::{Collection, EntityMeta, Lifecycle, StatusBearing, TransitionAction};
use crate::error::{TransitionError, TransitionResult};
use crate::permissions::{Actor, Capability};
use chrono::{DateTime, Utc};
use clinic_types::NonEmptyText;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LabPriority {
    Routine,
    Urgent,
    Stat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabOrderStatus {
    Ordered,
    SampleCollected,
    #[serde(rename = "in_progress")]
    Processing,
    Completed,
    Cancelled,
}

impl Lifecycle for LabOrderStatus {
    const TRANSITIONS: &'static [(Self, Self)] = &[
        (LabOrderStatus::Ordered, LabOrderStatus::SampleCollected),
        (LabOrderStatus::SampleCollected, LabOrderStatus::Processing),
        (LabOrderStatus::Processing, LabOrderStatus::Completed),
        (LabOrderStatus::Ordered, LabOrderStatus::Cancelled),
        (LabOrderStatus::SampleCollected, LabOrderStatus::Cancelled),
        (LabOrderStatus::Processing, LabOrderStatus::Cancelled),
    ];

    fn as_str(self) -> &'static str {
        match self {
            LabOrderStatus::Ordered => "ordered",
            LabOrderStatus::SampleCollected => "sample_collected",
            LabOrderStatus::Processing => "in_progress",
            LabOrderStatus::Completed => "completed",
            LabOrderStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for LabOrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single measured value in a lab result.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabParameter {
    pub name: NonEmptyText,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_range: Option<String>,
}

/// Result content submitted by the lab technician.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabResultPayload {
    #[serde(default)]
    pub parameters: Vec<LabParameter>,
    /// Opaque references to stored attachments (scans, PDFs).
    #[serde(default)]
    pub attachments: Vec<String>,
}

impl LabResultPayload {
    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty() && self.attachments.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabResult {
    pub parameters: Vec<LabParameter>,
    pub attachments: Vec<String>,
    pub completed_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LabOrderAction {
    CollectSample,
    StartProcessing,
    SubmitResult(LabResultPayload),
    Cancel,
}

impl TransitionAction for LabOrderAction {
    type Status = LabOrderStatus;

    fn target(&self) -> LabOrderStatus {
        match self {
            LabOrderAction::CollectSample => LabOrderStatus::SampleCollected,
            LabOrderAction::StartProcessing => LabOrderStatus::Processing,
            LabOrderAction::SubmitResult(_) => LabOrderStatus::Completed,
            LabOrderAction::Cancel => LabOrderStatus::Cancelled,
        }
    }

    fn capability(&self) -> Capability {
        match self {
            LabOrderAction::Cancel => Capability::CancelLabOrder,
            _ => Capability::ProgressLabOrder,
        }
    }
}

/// Input for ordering a test.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewLabOrder {
    pub patient_id: Uuid,
    pub test_name: NonEmptyText,
    pub test_code: NonEmptyText,
    pub priority: LabPriority,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabOrder {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub ordered_by_id: String,
    pub test_name: NonEmptyText,
    pub test_code: NonEmptyText,
    pub priority: LabPriority,
    pub status: LabOrderStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<LabResult>,
    #[serde(flatten)]
    pub meta: EntityMeta,
}

impl LabOrder {
    /// Builds a freshly ordered test.
    pub fn new(input: NewLabOrder, ordered_by: &Actor, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            patient_id: input.patient_id,
            ordered_by_id: ordered_by.id().to_string(),
            test_name: input.test_name,
            test_code: input.test_code,
            priority: input.priority,
            status: LabOrderStatus::Ordered,
            notes: input.notes.filter(|n| !n.trim().is_empty()),
            result: None,
            meta: EntityMeta::new(now),
        }
    }
}

impl StatusBearing for LabOrder {
    type Status = LabOrderStatus;
    type Action = LabOrderAction;

    const COLLECTION: Collection = Collection::LabOrders;

    fn id(&self) -> Uuid {
        self.id
    }

    fn patient_id(&self) -> Uuid {
        self.patient_id
    }

    fn status(&self) -> LabOrderStatus {
        self.status
    }

    fn meta(&self) -> &EntityMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut EntityMeta {
        &mut self.meta
    }

    fn validate(&self, action: &LabOrderAction) -> TransitionResult<()> {
        if let LabOrderAction::SubmitResult(payload) = action {
            if payload.is_empty() {
                return Err(TransitionError::ValidationFailed(
                    "lab result requires at least one parameter or attachment".into(),
                ));
            }
            if payload.attachments.iter().any(|a| a.trim().is_empty()) {
                return Err(TransitionError::ValidationFailed(
                    "attachment references cannot be empty".into(),
                ));
            }
        }
        Ok(())
    }

    fn apply(&mut self, action: LabOrderAction, _actor: &Actor, at: DateTime<Utc>) {
        self.status = action.target();
        if let LabOrderAction::SubmitResult(payload) = action {
            self.result = Some(LabResult {
                parameters: payload.parameters,
                attachments: payload.attachments,
                completed_at: at,
            });
        }
    }
}
