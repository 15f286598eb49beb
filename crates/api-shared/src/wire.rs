//! Status-change encoding per collection.
//!
//! A `PATCH /{collection}/{id}/status` body names a target status; each entity maps that
//! target (plus payload) to its typed action and back.

use crate::dto::{ResultParameter, StatusChangeReq};
use crate::error::{ApiError, ApiResult};
use clinic_core::lifecycle::{
    Bill, BillAction, BillStatus, LabOrder, LabOrderAction, LabOrderStatus, MedicalRecord,
    PrescriptionAction, PrescriptionStatus,
};
use clinic_core::{Capability, ErrorKind, Lifecycle, StatusBearing, TransitionAction};

/// Parses a wire status name such as `in_progress` or `partially_paid`.
pub fn parse_status<S: Lifecycle>(name: &str) -> ApiResult<S> {
    serde_json::from_value(serde_json::Value::String(name.to_owned()))
        .map_err(|_| ApiError::bad_request(format!("unknown status: {name}")))
}

fn no_transition_into<S: Lifecycle>(collection: &str, target: S) -> ApiError {
    ApiError::new(
        ErrorKind::IllegalTransition,
        format!("no {collection} transition leads to {target}"),
    )
}

pub trait WireEntity: StatusBearing {
    /// Builds the action that moves an entity into `target`.
    fn action_for(target: Self::Status, req: &StatusChangeReq) -> ApiResult<Self::Action>;

    /// Capability needed to ask for `target`, checked before the payload is looked at.
    ///
    /// Targets no transition leads to still map to the collection's progress capability, so
    /// callers without it are denied rather than told the move is illegal.
    fn capability_for(target: Self::Status) -> Capability;

    /// Encodes `action` as a request body.
    fn to_request(expected: Self::Status, action: &Self::Action) -> StatusChangeReq {
        StatusChangeReq::new(action.target().as_str(), expected.as_str())
    }

    /// Decodes a request body into the caller's assumed status and the action.
    fn decode(req: &StatusChangeReq) -> ApiResult<(Self::Status, Self::Action)> {
        let target = parse_status::<Self::Status>(&req.status)?;
        let expected = parse_status::<Self::Status>(&req.expected_status)?;
        Ok((expected, Self::action_for(target, req)?))
    }
}

impl WireEntity for LabOrder {
    fn action_for(target: LabOrderStatus, req: &StatusChangeReq) -> ApiResult<LabOrderAction> {
        match target {
            LabOrderStatus::SampleCollected => Ok(LabOrderAction::CollectSample),
            LabOrderStatus::Processing => Ok(LabOrderAction::StartProcessing),
            LabOrderStatus::Completed => Ok(LabOrderAction::SubmitResult(req.result_payload()?)),
            LabOrderStatus::Cancelled => Ok(LabOrderAction::Cancel),
            LabOrderStatus::Ordered => Err(no_transition_into(Self::COLLECTION.as_str(), target)),
        }
    }

    fn capability_for(target: LabOrderStatus) -> Capability {
        match target {
            LabOrderStatus::Cancelled => Capability::CancelLabOrder,
            _ => Capability::ProgressLabOrder,
        }
    }

    fn to_request(expected: LabOrderStatus, action: &LabOrderAction) -> StatusChangeReq {
        let mut req = StatusChangeReq::new(action.target().as_str(), expected.as_str());
        if let LabOrderAction::SubmitResult(payload) = action {
            req.parameters = payload.parameters.iter().map(ResultParameter::from).collect();
            req.attachments = payload.attachments.clone();
        }
        req
    }
}

impl WireEntity for MedicalRecord {
    fn action_for(
        target: PrescriptionStatus,
        _req: &StatusChangeReq,
    ) -> ApiResult<PrescriptionAction> {
        match target {
            PrescriptionStatus::Dispensed => Ok(PrescriptionAction::Dispense),
            PrescriptionStatus::Cancelled => Ok(PrescriptionAction::Cancel),
            PrescriptionStatus::Pending => {
                Err(no_transition_into(Self::COLLECTION.as_str(), target))
            }
        }
    }

    fn capability_for(target: PrescriptionStatus) -> Capability {
        match target {
            PrescriptionStatus::Cancelled => Capability::CancelPrescription,
            _ => Capability::DispensePrescription,
        }
    }
}

impl WireEntity for Bill {
    fn action_for(target: BillStatus, _req: &StatusChangeReq) -> ApiResult<BillAction> {
        match target {
            BillStatus::Paid => Ok(BillAction::ConfirmPayment),
            BillStatus::Cancelled => Ok(BillAction::Cancel),
            BillStatus::Pending | BillStatus::PartiallyPaid => {
                Err(no_transition_into(Self::COLLECTION.as_str(), target))
            }
        }
    }

    fn capability_for(target: BillStatus) -> Capability {
        match target {
            BillStatus::Cancelled => Capability::CancelInvoice,
            _ => Capability::UpdateInvoiceStatus,
        }
    }
}
