//! Local in-process cache tier configuration.

use std::env;

/// Settings for the optional local cache tier.
///
/// The local tier absorbs repeated reads between remote round-trips. A locally
/// cached copy must never outlive the authoritative remote copy, so the
/// per-entry local TTL passed to `get_or_set` must be strictly less than the
/// remote TTL; these settings only bound the tier's size and sweep cadence.
///
/// # Environment Variables
///
/// - `LOCAL_CACHE_ENABLED`: whether the local tier may be used (default: `true`)
/// - `LOCAL_CACHE_MAX_ENTRIES`: capacity before FIFO eviction (default: `1024`)
/// - `LOCAL_CACHE_SWEEP_SECONDS`: expired-entry sweep interval (default: `30`)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocalTierConfig {
    /// Whether the local tier may be used at all.
    pub enabled: bool,

    /// Maximum number of entries held before FIFO eviction.
    pub max_entries: usize,

    /// Interval between expired-entry sweeps, in seconds.
    pub sweep_interval_seconds: u64,
}

impl LocalTierConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            enabled: env::var("LOCAL_CACHE_ENABLED")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(true),
            max_entries: env::var("LOCAL_CACHE_MAX_ENTRIES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(1024),
            sweep_interval_seconds: env::var("LOCAL_CACHE_SWEEP_SECONDS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30),
        }
    }
}

impl Default for LocalTierConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: 1024,
            sweep_interval_seconds: 30,
        }
    }
}
