//! # Clinic Core
//!
//! Status lifecycle engine for the clinic's lab orders, prescriptions and bills.
//!
//! This crate owns the domain rules:
//! - closed status enums with static transition tables ([`lifecycle`])
//! - capability checks for every mutation ([`permissions`])
//! - the single mutation path with stale-state detection ([`executor`])
//! - pluggable storage with versioned compare-and-swap ([`store`])
//!
//! **No API concerns**: HTTP handlers, wire DTOs and client-side synchronization belong in
//! `api-rest`, `api-shared` and `clinic-sync`.

pub mod config;
pub mod consistency;
pub mod constants;
pub mod error;
pub mod executor;
pub mod lifecycle;
pub mod permissions;
pub mod query;
pub mod store;

pub use config::{ClinicConfig, ConfigError};
pub use consistency::{invalidation_scope, PatientWorkload};
pub use error::{ErrorKind, TransitionError, TransitionResult};
pub use executor::TransitionExecutor;
pub use lifecycle::{
    Bill, BillAction, BillStatus, Collection, LabOrder, LabOrderAction, LabOrderStatus,
    Lifecycle, MedicalRecord, PrescriptionAction, PrescriptionStatus, StatusBearing,
    TransitionAction,
};
pub use permissions::{Actor, Capability, PermissionGate, Role};
pub use query::ListFilter;
pub use store::{EntityStore, StoreError};
