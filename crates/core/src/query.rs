use crate::lifecycle::{Lifecycle, StatusBearing};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Filters accepted by collection snapshot reads.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ListFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_id: Option<Uuid>,
    /// Wire name of a status, e.g. `in_progress`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl ListFilter {
    pub fn for_patient(patient_id: Uuid) -> Self {
        Self {
            patient_id: Some(patient_id),
            status: None,
        }
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn matches<E: StatusBearing>(&self, entity: &E) -> bool {
        if self.patient_id.is_some_and(|p| p != entity.patient_id()) {
            return false;
        }
        if let Some(status) = &self.status {
            if entity.status().as_str() != status {
                return false;
            }
        }
        true
    }

    /// Canonical query string; identical filters always render identically.
    pub fn query_string(&self) -> String {
        let mut parts = Vec::new();
        if let Some(patient_id) = self.patient_id {
            parts.push(format!("patient_id={patient_id}"));
        }
        if let Some(status) = &self.status {
            parts.push(format!("status={status}"));
        }
        parts.join("&")
    }
}
