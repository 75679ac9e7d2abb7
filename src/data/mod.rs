//! Core data models for the Pitwall dashboard
//!
//! This module contains the snapshot payload served to the presentation layer
//! and the provider seam the cache uses to obtain fresh values.

pub mod ergast;
pub mod provider;

pub use ergast::{ErgastClient, ERGAST_BASE_URL};
pub use provider::{DataProvider, ProviderError};

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// A race weekend as reported by the data provider
///
/// All fields are opaque display values; the cache never interprets them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventInfo {
    /// Event name (e.g. "Monaco Grand Prix")
    pub name: String,
    /// "Locality, Country"
    pub location: String,
    /// Local calendar date of the session, `YYYY-MM-DD`
    pub date: String,
    /// Local time-of-day of the session, if the provider reports one
    #[serde(default)]
    pub time: Option<String>,
    /// Session name (Sprint Qualifying, Sprint, Qualifying, Race)
    #[serde(default, rename = "type")]
    pub session_type: Option<String>,
    /// Championship round number
    #[serde(deserialize_with = "compat::round_number")]
    pub round: u32,
}

/// A single championship standings row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StandingEntry {
    pub name: String,
    pub points: i64,
}

impl StandingEntry {
    pub fn new(name: impl Into<String>, points: i64) -> Self {
        Self {
            name: name.into(),
            points,
        }
    }
}

/// Top of the driver and constructor championships
///
/// The provider caps each list at three entries; the cache keeps the order and
/// length it is given.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StandingsInfo {
    #[serde(default)]
    pub drivers: Vec<StandingEntry>,
    #[serde(default)]
    pub constructors: Vec<StandingEntry>,
}

impl StandingsInfo {
    /// True before the first race of a season, when no points are scored yet
    pub fn is_empty(&self) -> bool {
        self.drivers.is_empty() && self.constructors.is_empty()
    }
}

/// One complete cache payload produced by a single refresh cycle
///
/// Snapshots are shared behind `Arc` and never mutated once built; a refresh
/// produces a new value which replaces the old one wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "compat::SnapshotRecord")]
pub struct Snapshot {
    /// Next upcoming session, if any remain
    pub next_event: Option<EventInfo>,
    /// Championship standings
    pub standings: StandingsInfo,
    /// The event following the next one
    pub event_after_next: Option<EventInfo>,
    /// When the refresh that produced this snapshot completed
    pub fetched_at: DateTime<Utc>,
    /// Wall-clock duration of the refresh in seconds
    pub fetch_duration_seconds: Option<f64>,
    /// Set only on placeholder snapshots returned when no data is available
    pub error: Option<String>,
}

/// Message attached to the placeholder returned when nothing was ever fetched
pub const UNAVAILABLE_MESSAGE: &str = "Unable to fetch F1 data";

impl Snapshot {
    /// Creates the placeholder served when no fetch has ever succeeded
    pub fn unavailable(now: DateTime<Utc>, reason: impl Into<String>) -> Self {
        Self {
            next_event: None,
            standings: StandingsInfo::default(),
            event_after_next: None,
            fetched_at: now,
            fetch_duration_seconds: None,
            error: Some(reason.into()),
        }
    }

    /// Returns true for placeholder snapshots carrying an error
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Lenient decoding for snapshot files written by older dashboard versions.
mod compat {
    use super::*;

    /// Wire shape accepted when reading a snapshot.
    #[derive(Deserialize)]
    pub(super) struct SnapshotRecord {
        #[serde(default)]
        next_event: Option<EventInfo>,
        #[serde(default)]
        standings: Option<StandingsInfo>,
        #[serde(default)]
        event_after_next: Option<EventInfo>,
        #[serde(alias = "last_updated", deserialize_with = "timestamp")]
        fetched_at: DateTime<Utc>,
        #[serde(default)]
        fetch_duration_seconds: Option<f64>,
        #[serde(default)]
        fetch_duration_minutes: Option<f64>,
        #[serde(default)]
        error: Option<String>,
    }

    impl From<SnapshotRecord> for Snapshot {
        fn from(record: SnapshotRecord) -> Self {
            let fetch_duration_seconds = record
                .fetch_duration_seconds
                .or_else(|| record.fetch_duration_minutes.map(|m| m * 60.0));

            Snapshot {
                next_event: record.next_event,
                standings: record.standings.unwrap_or_default(),
                event_after_next: record.event_after_next,
                fetched_at: record.fetched_at,
                fetch_duration_seconds,
                error: record.error,
            }
        }
    }

    /// Parses an RFC 3339 timestamp, or a naive ISO-8601 one in local time.
    pub(crate) fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
        if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
            return Some(parsed.with_timezone(&Utc));
        }

        let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
            .ok()?;

        Local
            .from_local_datetime(&naive)
            .earliest()
            .map(|local| local.with_timezone(&Utc))
    }

    pub(crate) fn timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse_timestamp(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {raw}")))
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RoundRepr {
        Number(u32),
        Text(String),
    }

    pub(super) fn round_number<'de, D>(deserializer: D) -> Result<u32, D::Error>
    where
        D: Deserializer<'de>,
    {
        match RoundRepr::deserialize(deserializer)? {
            RoundRepr::Number(n) => Ok(n),
            RoundRepr::Text(s) => s
                .trim()
                .parse()
                .map_err(|_| serde::de::Error::custom(format!("invalid round number: {s}"))),
        }
    }
}

pub(crate) use compat::parse_timestamp;
