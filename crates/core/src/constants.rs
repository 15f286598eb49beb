//! Constants used throughout the clinic core crate.

/// Interval between full-snapshot polls of a watched collection.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 30;

/// Lifetime of a cached read between polls.
pub const DEFAULT_CACHE_TTL_SECS: u64 = 20;

/// GST rate applied at bill creation, in basis points (18%).
pub const DEFAULT_GST_RATE_BPS: u32 = 1_800;

/// Upper bound for a configured GST rate (100%).
pub const MAX_GST_RATE_BPS: u32 = 10_000;

/// Default listen address for the REST API.
pub const DEFAULT_REST_ADDR: &str = "0.0.0.0:3000";

/// Prefix of human-facing bill numbers.
pub const BILL_NUMBER_PREFIX: &str = "BILL";

/// File extension used by the JSON file store.
pub const RECORD_FILE_EXTENSION: &str = "json";
