//! Runtime configuration.
//!
//! Configuration is resolved once at process startup and passed into services behind an
//! `Arc`. Binaries read environment variables and hand the raw values to the parsing helpers
//! here; nothing in this crate reads the process environment during request handling.

use crate::constants::{
    DEFAULT_CACHE_TTL_SECS, DEFAULT_GST_RATE_BPS, DEFAULT_POLL_INTERVAL_SECS, DEFAULT_REST_ADDR,
    MAX_GST_RATE_BPS,
};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} must be a positive whole number, got '{value}'")]
    InvalidNumber { name: &'static str, value: String },
    #[error("{name} must be greater than zero")]
    Zero { name: &'static str },
    #[error("GST rate {0} bps exceeds {MAX_GST_RATE_BPS}")]
    GstRateTooHigh(u32),
    #[error("cache TTL ({ttl:?}) must be shorter than the poll interval ({poll:?})")]
    CacheOutlivesPoll { ttl: Duration, poll: Duration },
    #[error("listen address cannot be empty")]
    EmptyAddress,
}

/// Core configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct ClinicConfig {
    rest_addr: String,
    data_dir: Option<PathBuf>,
    poll_interval: Duration,
    cache_ttl: Duration,
    gst_rate_bps: u32,
    api_key: Option<String>,
}

impl ClinicConfig {
    pub fn new(
        rest_addr: String,
        data_dir: Option<PathBuf>,
        poll_interval: Duration,
        cache_ttl: Duration,
        gst_rate_bps: u32,
        api_key: Option<String>,
    ) -> Result<Self, ConfigError> {
        if rest_addr.trim().is_empty() {
            return Err(ConfigError::EmptyAddress);
        }
        if poll_interval.is_zero() {
            return Err(ConfigError::Zero {
                name: "poll interval",
            });
        }
        if cache_ttl.is_zero() {
            return Err(ConfigError::Zero { name: "cache TTL" });
        }
        if cache_ttl >= poll_interval {
            return Err(ConfigError::CacheOutlivesPoll {
                ttl: cache_ttl,
                poll: poll_interval,
            });
        }
        if gst_rate_bps > MAX_GST_RATE_BPS {
            return Err(ConfigError::GstRateTooHigh(gst_rate_bps));
        }

        Ok(Self {
            rest_addr,
            data_dir,
            poll_interval,
            cache_ttl,
            gst_rate_bps,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        })
    }

    pub fn rest_addr(&self) -> &str {
        &self.rest_addr
    }

    /// Directory for the JSON file store; `None` selects the in-memory store.
    pub fn data_dir(&self) -> Option<&Path> {
        self.data_dir.as_deref()
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn cache_ttl(&self) -> Duration {
        self.cache_ttl
    }

    pub fn gst_rate_bps(&self) -> u32 {
        self.gst_rate_bps
    }

    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }
}

impl Default for ClinicConfig {
    fn default() -> Self {
        Self {
            rest_addr: DEFAULT_REST_ADDR.into(),
            data_dir: None,
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            cache_ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECS),
            gst_rate_bps: DEFAULT_GST_RATE_BPS,
            api_key: None,
        }
    }
}

fn trimmed(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parse a whole-second duration from an optional environment value.
///
/// `None` or blank values fall back to `default_secs`.
pub fn duration_secs_from_env_value(
    name: &'static str,
    value: Option<String>,
    default_secs: u64,
) -> Result<Duration, ConfigError> {
    let Some(raw) = trimmed(value) else {
        return Ok(Duration::from_secs(default_secs));
    };
    let secs: u64 = raw
        .parse()
        .map_err(|_| ConfigError::InvalidNumber { name, value: raw })?;
    if secs == 0 {
        return Err(ConfigError::Zero { name });
    }
    Ok(Duration::from_secs(secs))
}

/// Parse the GST rate (basis points) from an optional environment value.
pub fn gst_rate_from_env_value(value: Option<String>) -> Result<u32, ConfigError> {
    let Some(raw) = trimmed(value) else {
        return Ok(DEFAULT_GST_RATE_BPS);
    };
    let bps: u32 = raw.parse().map_err(|_| ConfigError::InvalidNumber {
        name: "CLINIC_GST_RATE_BPS",
        value: raw,
    })?;
    if bps > MAX_GST_RATE_BPS {
        return Err(ConfigError::GstRateTooHigh(bps));
    }
    Ok(bps)
}

/// Parse the optional data directory. Blank values select the in-memory store.
pub fn data_dir_from_env_value(value: Option<String>) -> Option<PathBuf> {
    trimmed(value).map(PathBuf::from)
}
