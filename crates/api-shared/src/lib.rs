//! # API Shared
//!
//! Shared wire contract for the clinic APIs.
//!
//! Contains:
//! - Request/response DTOs with OpenAPI schemas (`dto` module)
//! - The `{ kind, message }` error envelope and its HTTP status mapping
//! - Status-change encoding for each collection (`wire` module)
//! - Actor extraction and API-key checks (usable by the server and its clients)
//!
//! Used by `api-rest` on the server side and by `clinic-sync` / `clinic` as a client.

pub mod auth;
pub mod dto;
pub mod error;
pub mod health;
pub mod wire;

pub use dto::*;
pub use error::{ApiError, ApiResult};
pub use health::HealthService;
pub use wire::{parse_status, WireEntity};
