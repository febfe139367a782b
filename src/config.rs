//! Configuration Module
//!
//! Handles loading cache configuration from environment variables.

use std::env;
use std::time::Duration;

/// Cache configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Sliding expiration window in milliseconds
    pub sliding_expiration_ms: u64,
    /// Maximum number of entries the backing store can hold
    pub max_entries: usize,
    /// Background cleanup task interval in milliseconds
    pub cleanup_interval_ms: u64,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `SLIDING_EXPIRATION_MS` - Idle window before eviction (default: 300000)
    /// - `MAX_ENTRIES` - Maximum store entries (default: 10000)
    /// - `CLEANUP_INTERVAL_MS` - Cleanup frequency in milliseconds (default: 1000)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            sliding_expiration_ms: parse_var("SLIDING_EXPIRATION_MS")
                .unwrap_or(defaults.sliding_expiration_ms),
            max_entries: parse_var("MAX_ENTRIES").unwrap_or(defaults.max_entries),
            cleanup_interval_ms: parse_var("CLEANUP_INTERVAL_MS")
                .unwrap_or(defaults.cleanup_interval_ms),
        }
    }

    /// Sliding expiration window as a `Duration`.
    pub fn sliding_expiration(&self) -> Duration {
        Duration::from_millis(self.sliding_expiration_ms)
    }

    /// Cleanup interval as a `Duration`.
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_millis(self.cleanup_interval_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sliding_expiration_ms: 300_000,
            max_entries: 10_000,
            cleanup_interval_ms: 1_000,
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.parse().ok())
}
