//! Standalone REST API server binary.
//!
//! ## Purpose
//! Runs the REST API server on its own, with OpenAPI/Swagger UI.
//!
//! ## Intended use
//! Useful for development and debugging. The workspace's `clinic-run` binary serves the same
//! router with the same configuration.

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Main entry point for the clinic REST API server.
///
/// # Environment Variables
/// - `CLINIC_REST_ADDR`: Server address (default: "0.0.0.0:3000")
/// - `CLINIC_DATA_DIR`: JSON store directory (unset: in-memory store)
/// - `CLINIC_GST_RATE_BPS`: GST rate in basis points (default: 1800)
/// - `CLINIC_API_KEY`: Shared API key (unset: check disabled)
///
/// # Errors
/// Returns an error if:
/// - the logging/tracing configuration cannot be initialised,
/// - configuration is malformed,
/// - the store cannot be opened or the address cannot be bound.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("api_rest=info".parse()?)
                .add_directive("clinic_core=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cfg = Arc::new(api_rest::config_from_env()?);
    api_rest::serve(cfg).await
}
