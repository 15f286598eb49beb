use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Main entry point for the clinic service.
///
/// Resolves configuration once, opens the store it selects and serves the REST API until
/// ctrl-c.
///
/// # Environment Variables
/// - `CLINIC_REST_ADDR`: REST server address (default: "0.0.0.0:3000")
/// - `CLINIC_DATA_DIR`: Directory for the JSON file store (unset: in-memory store)
/// - `CLINIC_POLL_INTERVAL_SECS`: Client poll interval advertised to tooling (default: 30)
/// - `CLINIC_CACHE_TTL_SECS`: Client read cache TTL (default: 20)
/// - `CLINIC_GST_RATE_BPS`: GST rate applied to new bills, in basis points (default: 1800)
/// - `CLINIC_API_KEY`: Shared API key required in `x-api-key` (unset: check disabled)
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("clinic=info".parse()?)
                .add_directive("api_rest=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cfg = Arc::new(api_rest::config_from_env()?);
    tracing::info!(
        store = if cfg.data_dir().is_some() { "file" } else { "memory" },
        gst_rate_bps = cfg.gst_rate_bps(),
        "configuration resolved"
    );

    api_rest::serve(cfg).await
}
