//! The narrow interface the cache uses to obtain fresh data
//!
//! Each operation is slow (seconds to minutes) and may fail independently.
//! Pacing between calls is the caller's job, not the provider's.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use super::{EventInfo, StandingsInfo};

/// Errors that can occur while fetching data from the provider
#[derive(Debug, Error)]
pub enum ProviderError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// Failed to parse JSON response
    #[error("Failed to parse JSON response: {0}")]
    ParseError(#[from] serde_json::Error),

    /// Missing expected field in response
    #[error("Missing expected field in response: {0}")]
    MissingField(String),

    /// Invalid date or time in response
    #[error("Invalid time format: {0}")]
    InvalidTimeFormat(String),

    /// A field was present but held an unusable value
    #[error("Invalid value in response: {0}")]
    InvalidValue(String),

    /// Upstream could not serve the request
    #[error("Provider unavailable: {0}")]
    Unavailable(String),
}

/// Source of the three values that make up a snapshot
///
/// `now` is the reference time used to decide what counts as "upcoming".
#[async_trait]
pub trait DataProvider: Send + Sync {
    /// The next meaningful session across all upcoming events
    async fn next_event(&self, now: DateTime<Utc>) -> Result<Option<EventInfo>, ProviderError>;

    /// Top three drivers and constructors for the current season
    async fn current_standings(&self, now: DateTime<Utc>) -> Result<StandingsInfo, ProviderError>;

    /// The event following the next one
    async fn event_after_next(&self, now: DateTime<Utc>)
        -> Result<Option<EventInfo>, ProviderError>;
}
