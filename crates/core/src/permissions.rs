//! Permission gate.
//!
//! Role-based dispatch is a plain lookup: each [`Role`] maps to a fixed set of
//! [`Capability`] values, and an [`Actor`] carries the union of its role set and any explicit
//! grants handed out by the external auth layer. Some capabilities are also bound to a role
//! (see [`Capability::required_role`]); a grant cannot lift an actor past that check. The gate
//! is consulted before the status model is asked whether a transition is structurally legal.

use crate::error::{TransitionError, TransitionResult};
use clinic_types::NonEmptyText;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// A named permission checked before any mutation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    CreateInvoice,
    UpdateInvoiceStatus,
    DownloadInvoice,
    CancelInvoice,
    DeleteInvoice,
    OrderLabTest,
    ProgressLabOrder,
    CancelLabOrder,
    CreateMedicalRecord,
    DispensePrescription,
    CancelPrescription,
}

impl Capability {
    pub const ALL: [Capability; 11] = [
        Capability::CreateInvoice,
        Capability::UpdateInvoiceStatus,
        Capability::DownloadInvoice,
        Capability::CancelInvoice,
        Capability::DeleteInvoice,
        Capability::OrderLabTest,
        Capability::ProgressLabOrder,
        Capability::CancelLabOrder,
        Capability::CreateMedicalRecord,
        Capability::DispensePrescription,
        Capability::CancelPrescription,
    ];

    /// The role an actor must hold for this capability to count, whatever it was granted.
    pub fn required_role(self) -> Option<Role> {
        match self {
            Capability::ProgressLabOrder | Capability::CancelLabOrder => Some(Role::LabTechnician),
            Capability::DispensePrescription => Some(Role::Pharmacist),
            Capability::CancelInvoice | Capability::DeleteInvoice => Some(Role::Admin),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Capability::CreateInvoice => "create_invoice",
            Capability::UpdateInvoiceStatus => "update_invoice_status",
            Capability::DownloadInvoice => "download_invoice",
            Capability::CancelInvoice => "cancel_invoice",
            Capability::DeleteInvoice => "delete_invoice",
            Capability::OrderLabTest => "order_lab_test",
            Capability::ProgressLabOrder => "progress_lab_order",
            Capability::CancelLabOrder => "cancel_lab_order",
            Capability::CreateMedicalRecord => "create_medical_record",
            Capability::DispensePrescription => "dispense_prescription",
            Capability::CancelPrescription => "cancel_prescription",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Capability {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Capability::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("unknown capability: {s}"))
    }
}

/// Clinic staff roles.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Doctor,
    Reception,
    Pharmacist,
    LabTechnician,
}

impl Role {
    /// The capability set granted to every actor holding this role.
    pub fn capabilities(self) -> &'static [Capability] {
        use Capability::*;
        match self {
            Role::Admin => &[
                CreateInvoice,
                UpdateInvoiceStatus,
                DownloadInvoice,
                CancelInvoice,
                DeleteInvoice,
            ],
            Role::Reception => &[CreateInvoice, UpdateInvoiceStatus, DownloadInvoice],
            Role::Doctor => &[OrderLabTest, CreateMedicalRecord, DownloadInvoice],
            Role::Pharmacist => &[DispensePrescription, CancelPrescription],
            Role::LabTechnician => &[ProgressLabOrder, CancelLabOrder],
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Doctor => "doctor",
            Role::Reception => "reception",
            Role::Pharmacist => "pharmacist",
            Role::LabTechnician => "lab_technician",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "admin" => Ok(Role::Admin),
            "doctor" => Ok(Role::Doctor),
            "reception" => Ok(Role::Reception),
            "pharmacist" => Ok(Role::Pharmacist),
            "lab_technician" => Ok(Role::LabTechnician),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

pub type CapabilitySet = BTreeSet<Capability>;

/// Answers whether a capability set allows `capability`.
pub fn can_perform(capabilities: &CapabilitySet, capability: Capability) -> bool {
    capabilities.contains(&capability)
}

/// An already-authenticated person requesting an operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Actor {
    id: NonEmptyText,
    role: Role,
    capabilities: CapabilitySet,
}

impl Actor {
    pub fn new(id: NonEmptyText, role: Role) -> Self {
        Self {
            id,
            role,
            capabilities: role.capabilities().iter().copied().collect(),
        }
    }

    /// Adds an explicit grant on top of the role's set.
    pub fn with_grant(mut self, capability: Capability) -> Self {
        self.capabilities.insert(capability);
        self
    }

    pub fn id(&self) -> &NonEmptyText {
        &self.id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn capabilities(&self) -> &CapabilitySet {
        &self.capabilities
    }

    pub fn can(&self, capability: Capability) -> bool {
        if capability
            .required_role()
            .is_some_and(|required| required != self.role)
        {
            return false;
        }
        can_perform(&self.capabilities, capability)
    }
}

/// Zero-sized namespace for gate checks that produce executor errors.
pub struct PermissionGate;

impl PermissionGate {
    /// Fails with [`TransitionError::PermissionDenied`] unless `actor` holds `capability`.
    pub fn authorize(actor: &Actor, capability: Capability) -> TransitionResult<()> {
        if actor.can(capability) {
            return Ok(());
        }
        tracing::warn!(
            actor = %actor.id(),
            role = %actor.role(),
            %capability,
            "permission denied"
        );
        Err(TransitionError::PermissionDenied {
            role: actor.role(),
            capability,
        })
    }
}
