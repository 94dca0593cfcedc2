//! Configuration Module
//!
//! Handles loading and managing cache configuration from environment variables.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use chrono::Duration;

use crate::cache::{CacheSettings, LastModifiedTimeout, TimeoutPolicy};
use crate::codec::DEFAULT_EXTENSION;

/// Cache configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Directory holding one subdirectory per cache
    pub root: PathBuf,
    /// Maximum size of one entry in bytes, 0 = unlimited
    pub max_entry_size: u64,
    /// Maximum size of one cache in bytes, 0 = unlimited
    pub max_total_size: u64,
    /// Entry timeout in seconds since last write, 0 = entries never go stale
    pub timeout: u64,
    /// Prune entries unused for this many seconds, 0 = disabled
    pub idle_timeout: u64,
    /// Background refresh and prune interval in seconds
    pub refresh_interval: u64,
    /// Blob name extension
    pub extension: String,
    /// Report file access times to the engine
    pub track_access: bool,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_ROOT` - Cache root directory (default: ./cache)
    /// - `CACHE_MAX_ENTRY_SIZE` - Per-entry limit in bytes (default: 0)
    /// - `CACHE_MAX_TOTAL_SIZE` - Per-cache limit in bytes (default: 0)
    /// - `CACHE_TIMEOUT` - Entry timeout in seconds (default: 0)
    /// - `CACHE_IDLE_TIMEOUT` - Idle prune timeout in seconds (default: 0)
    /// - `CACHE_REFRESH_INTERVAL` - Maintenance frequency in seconds (default: 60)
    /// - `CACHE_EXTENSION` - Blob extension (default: bin)
    /// - `CACHE_TRACK_ACCESS` - Use file access times (default: false)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            root: env::var("CACHE_ROOT")
                .map(PathBuf::from)
                .unwrap_or(defaults.root),
            max_entry_size: parse_var("CACHE_MAX_ENTRY_SIZE").unwrap_or(defaults.max_entry_size),
            max_total_size: parse_var("CACHE_MAX_TOTAL_SIZE").unwrap_or(defaults.max_total_size),
            timeout: parse_var("CACHE_TIMEOUT").unwrap_or(defaults.timeout),
            idle_timeout: parse_var("CACHE_IDLE_TIMEOUT").unwrap_or(defaults.idle_timeout),
            refresh_interval: parse_var("CACHE_REFRESH_INTERVAL")
                .unwrap_or(defaults.refresh_interval),
            extension: env::var("CACHE_EXTENSION").unwrap_or(defaults.extension),
            track_access: parse_var("CACHE_TRACK_ACCESS").unwrap_or(defaults.track_access),
        }
    }

    /// Engine settings derived from this configuration.
    pub fn settings(&self) -> CacheSettings {
        CacheSettings {
            max_entry_size: self.max_entry_size,
            max_total_size: self.max_total_size,
            prune_idle_timeout: seconds(self.idle_timeout),
            extension: self.extension.clone(),
            ..CacheSettings::default()
        }
    }

    /// Staleness policy derived from `timeout`, if any.
    pub fn timeout_policy(&self) -> Option<Arc<dyn TimeoutPolicy>> {
        seconds(self.timeout)
            .map(|timeout| Arc::new(LastModifiedTimeout::new(timeout)) as Arc<dyn TimeoutPolicy>)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./cache"),
            max_entry_size: 0,
            max_total_size: 0,
            timeout: 0,
            idle_timeout: 0,
            refresh_interval: 60,
            extension: DEFAULT_EXTENSION.to_string(),
            track_access: false,
        }
    }
}

fn parse_var<T: FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

/// Zero means disabled, and so does a value too large to represent.
fn seconds(secs: u64) -> Option<Duration> {
    i64::try_from(secs)
        .ok()
        .filter(|secs| *secs > 0)
        .and_then(Duration::try_seconds)
}
