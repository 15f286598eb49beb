//! Request and response bodies of the REST contract.
//!
//! Entities themselves travel as their stored JSON form; these types cover everything else.

use crate::error::{ApiError, ApiResult};
use clinic_core::lifecycle::{
    LabParameter, LabPriority, LabResultPayload, NewBill, NewBillItem, NewLabOrder,
    NewMedicalRecord, PrescriptionLine,
};
use clinic_core::ErrorKind;
use clinic_types::{Money, NonEmptyText};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct HealthRes {
    pub ok: bool,
    pub message: String,
}

/// Error body returned with every non-2xx response.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ErrorRes {
    #[schema(value_type = String, example = "StaleState")]
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&ApiError> for ErrorRes {
    fn from(err: &ApiError) -> Self {
        Self {
            kind: err.kind,
            message: err.message.clone(),
        }
    }
}

/// Full snapshot of a collection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListRes<T> {
    pub items: Vec<T>,
}

/// Query parameters of `GET /{collection}`.
#[derive(Clone, Debug, Default, Serialize, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListQuery {
    pub patient_id: Option<Uuid>,
    pub status: Option<String>,
}

impl From<ListQuery> for clinic_core::ListFilter {
    fn from(q: ListQuery) -> Self {
        Self {
            patient_id: q.patient_id,
            status: q.status,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ResultParameter {
    pub name: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_range: Option<String>,
}

/// Body of `PATCH /{collection}/{id}/status`.
///
/// `parameters` and `attachments` are only read when completing a lab order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct StatusChangeReq {
    #[schema(example = "paid")]
    pub status: String,
    #[schema(example = "pending")]
    pub expected_status: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<ResultParameter>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<String>,
}

impl StatusChangeReq {
    pub fn new(status: &str, expected_status: &str) -> Self {
        Self {
            status: status.to_owned(),
            expected_status: expected_status.to_owned(),
            parameters: Vec::new(),
            attachments: Vec::new(),
        }
    }

    /// The lab result carried by this request.
    ///
    /// Blank parameter names are a validation failure, not a malformed request.
    pub fn result_payload(&self) -> ApiResult<LabResultPayload> {
        let parameters = self
            .parameters
            .iter()
            .map(|p| {
                let name = NonEmptyText::new(&p.name)
                    .map_err(|_| ApiError::validation("result parameter name cannot be empty"))?;
                Ok(LabParameter {
                    name,
                    value: p.value.clone(),
                    unit: p.unit.clone(),
                    reference_range: p.reference_range.clone(),
                })
            })
            .collect::<ApiResult<Vec<_>>>()?;
        Ok(LabResultPayload {
            parameters,
            attachments: self.attachments.clone(),
        })
    }
}

impl From<&LabParameter> for ResultParameter {
    fn from(p: &LabParameter) -> Self {
        Self {
            name: p.name.to_string(),
            value: p.value.clone(),
            unit: p.unit.clone(),
            reference_range: p.reference_range.clone(),
        }
    }
}

fn text(field: &str, value: &str) -> ApiResult<NonEmptyText> {
    NonEmptyText::new(value).map_err(|_| ApiError::validation(format!("{field} cannot be empty")))
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CreateLabOrderReq {
    pub patient_id: Uuid,
    pub test_name: String,
    pub test_code: String,
    /// `routine`, `urgent` or `stat`.
    #[serde(default = "default_priority")]
    pub priority: String,
    #[serde(default)]
    pub notes: Option<String>,
}

fn default_priority() -> String {
    "routine".into()
}

impl TryFrom<CreateLabOrderReq> for NewLabOrder {
    type Error = ApiError;

    fn try_from(req: CreateLabOrderReq) -> ApiResult<Self> {
        let priority: LabPriority =
            serde_json::from_value(serde_json::Value::String(req.priority.clone()))
                .map_err(|_| ApiError::bad_request(format!("unknown priority: {}", req.priority)))?;
        Ok(NewLabOrder {
            patient_id: req.patient_id,
            test_name: text("test_name", &req.test_name)?,
            test_code: text("test_code", &req.test_code)?,
            priority,
            notes: req.notes.filter(|n| !n.trim().is_empty()),
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PrescriptionLineReq {
    pub medicine_name: String,
    pub dosage: String,
    pub frequency: String,
    pub duration: String,
    #[serde(default)]
    pub instructions: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CreateMedicalRecordReq {
    pub patient_id: Uuid,
    #[serde(default)]
    pub diagnosis: Option<String>,
    #[serde(default)]
    pub prescriptions: Vec<PrescriptionLineReq>,
}

impl TryFrom<CreateMedicalRecordReq> for NewMedicalRecord {
    type Error = ApiError;

    fn try_from(req: CreateMedicalRecordReq) -> ApiResult<Self> {
        let prescriptions = req
            .prescriptions
            .into_iter()
            .map(|line| {
                Ok(PrescriptionLine {
                    medicine_name: text("medicine_name", &line.medicine_name)?,
                    dosage: text("dosage", &line.dosage)?,
                    frequency: text("frequency", &line.frequency)?,
                    duration: text("duration", &line.duration)?,
                    instructions: line.instructions,
                })
            })
            .collect::<ApiResult<Vec<_>>>()?;
        Ok(NewMedicalRecord {
            patient_id: req.patient_id,
            diagnosis: req.diagnosis,
            prescriptions,
        })
    }
}

/// Amounts are integer minor units (paise, cents).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct BillItemReq {
    pub description: String,
    pub quantity: u32,
    pub unit_price: i64,
    #[serde(default)]
    pub medicine_id: Option<Uuid>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CreateBillReq {
    pub patient_id: Uuid,
    pub items: Vec<BillItemReq>,
    #[serde(default)]
    pub discount: i64,
    #[serde(default)]
    pub initial_payment: Option<i64>,
}

impl TryFrom<CreateBillReq> for NewBill {
    type Error = ApiError;

    fn try_from(req: CreateBillReq) -> ApiResult<Self> {
        let items = req
            .items
            .into_iter()
            .map(|item| {
                Ok(NewBillItem {
                    description: text("description", &item.description)?,
                    quantity: item.quantity,
                    unit_price: Money::from_minor(item.unit_price)?,
                    medicine_id: item.medicine_id,
                })
            })
            .collect::<ApiResult<Vec<_>>>()?;
        Ok(NewBill {
            patient_id: req.patient_id,
            items,
            discount: Money::from_minor(req.discount)?,
            initial_payment: req.initial_payment.map(Money::from_minor).transpose()?,
        })
    }
}
