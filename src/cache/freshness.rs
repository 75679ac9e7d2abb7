//! Decides whether the cached data is old enough to refresh.

use chrono::{DateTime, Duration, Utc};

/// Returns true when a refresh is due
///
/// Data that was never fetched is always due; otherwise the data is due once
/// `interval` has fully elapsed since the last successful update.
pub fn is_due(last_success_at: Option<DateTime<Utc>>, now: DateTime<Utc>, interval: Duration) -> bool {
    match last_success_at {
        None => true,
        Some(last) => now - last >= interval,
    }
}

/// Age of the data in hours, rounded to one decimal place
pub fn age_hours(last_success_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let hours = (now - last_success_at).num_milliseconds() as f64 / 3_600_000.0;
    (hours * 10.0).round() / 10.0
}
