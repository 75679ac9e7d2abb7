//! Tunables for the dashboard cache
//!
//! Only `poll_interval_hours` and `cache_file` are exposed on the command line;
//! the remaining durations are implementation constants kept here so tests can
//! shrink them.

use std::path::PathBuf;
use std::time::Duration;

use directories::ProjectDirs;
use thiserror::Error;

/// File name used for the persisted snapshot
pub const CACHE_FILE_NAME: &str = "dashboard_data.json";

/// Error types for cache configuration
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Poll interval must be a whole number of hours, at least one
    #[error("Invalid poll interval: {0} hours (must be at least 1)")]
    InvalidPollInterval(u32),

    /// A duration that drives a sleep loop was zero
    #[error("Invalid {0}: must be greater than zero")]
    ZeroDuration(&'static str),
}

/// Configuration for the dashboard cache and its background scheduler
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// How often data is refreshed, in hours
    pub poll_interval_hours: u32,
    /// Where the snapshot is persisted
    pub cache_file: PathBuf,
    /// Grace period before the scheduler's first freshness check
    pub initial_delay: Duration,
    /// Time between freshness checks
    pub check_interval: Duration,
    /// Longest single sleep; bounds shutdown latency
    pub sleep_slice: Duration,
    /// Back-off after an unexpected failure inside the scheduler loop
    pub error_cooldown: Duration,
    /// Pause between the provider calls of one refresh cycle
    pub fetch_pause: Duration,
    /// How long `stop()` waits for the scheduler to exit
    pub stop_timeout: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            poll_interval_hours: 12,
            cache_file: default_cache_file(),
            initial_delay: Duration::from_secs(30),
            check_interval: Duration::from_secs(300), // 5 minutes
            sleep_slice: Duration::from_secs(60),
            error_cooldown: Duration::from_secs(300),
            fetch_pause: Duration::from_secs(2),
            stop_timeout: Duration::from_secs(5),
        }
    }
}

impl CacheConfig {
    /// Default configuration with a custom cache file
    pub fn with_cache_file(cache_file: impl Into<PathBuf>) -> Self {
        Self {
            cache_file: cache_file.into(),
            ..Self::default()
        }
    }

    /// The poll interval as a chrono duration for freshness checks
    pub fn poll_interval(&self) -> chrono::Duration {
        chrono::Duration::hours(i64::from(self.poll_interval_hours))
    }

    /// Checks that the configuration can drive the scheduler
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_hours < 1 {
            return Err(ConfigError::InvalidPollInterval(self.poll_interval_hours));
        }
        if self.check_interval.is_zero() {
            return Err(ConfigError::ZeroDuration("check interval"));
        }
        if self.sleep_slice.is_zero() {
            return Err(ConfigError::ZeroDuration("sleep slice"));
        }
        Ok(())
    }
}

/// XDG cache location (`~/.cache/pitwall/dashboard_data.json` on Linux),
/// or the working directory when no home directory is available
pub fn default_cache_file() -> PathBuf {
    ProjectDirs::from("", "", "pitwall")
        .map(|dirs| dirs.cache_dir().join(CACHE_FILE_NAME))
        .unwrap_or_else(|| PathBuf::from(CACHE_FILE_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_config_default() {
        let config = CacheConfig::default();
        assert_eq!(config.poll_interval_hours, 12);
        assert_eq!(config.initial_delay, Duration::from_secs(30));
        assert_eq!(config.sleep_slice, Duration::from_secs(60));
        assert_eq!(config.fetch_pause, Duration::from_secs(2));
        assert!(config.cache_file.ends_with(CACHE_FILE_NAME));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_poll_interval_converts_hours() {
        let config = CacheConfig {
            poll_interval_hours: 3,
            ..CacheConfig::default()
        };
        assert_eq!(config.poll_interval(), chrono::Duration::hours(3));
    }

    #[test]
    fn test_validate_rejects_zero_poll_interval() {
        let config = CacheConfig {
            poll_interval_hours: 0,
            ..CacheConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::InvalidPollInterval(0)));
    }

    #[test]
    fn test_validate_rejects_zero_sleep_slice() {
        let config = CacheConfig {
            sleep_slice: Duration::ZERO,
            ..CacheConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroDuration("sleep slice")));
    }

    #[test]
    fn test_with_cache_file_keeps_other_defaults() {
        let config = CacheConfig::with_cache_file("/tmp/f1.json");
        assert_eq!(config.cache_file, PathBuf::from("/tmp/f1.json"));
        assert_eq!(config.poll_interval_hours, 12);
    }
}
