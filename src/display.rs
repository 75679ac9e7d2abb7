//! Plain-text rendering of the dashboard
//!
//! `render_dashboard` is a pure formatter. `watch` drives it from a running
//! cache on a fixed cadence.

use std::fmt::Write;
use std::future::Future;
use std::time::Duration;

use tokio::time::MissedTickBehavior;

use crate::cache::{CacheStatus, DashboardCache};
use crate::data::{EventInfo, Snapshot, StandingEntry};

/// Fetches the current snapshot and renders it with the cache status
pub async fn render_current(cache: &DashboardCache) -> String {
    let snapshot = cache.get_data().await;
    render_dashboard(&snapshot, &cache.get_status())
}

/// Renders the dashboard every `period` until `shutdown` resolves
///
/// # Arguments
/// * `cache` - Running cache to read from
/// * `period` - Time between frames; a slow frame delays the next one
/// * `shutdown` - Resolves when the loop should end; stays armed while a frame
///   is being fetched
/// * `emit` - Receives each rendered frame
pub async fn watch<F, W>(cache: &DashboardCache, period: Duration, shutdown: F, mut emit: W)
where
    F: Future<Output = ()>,
    W: FnMut(String),
{
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut shutdown = std::pin::pin!(shutdown);

    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => break,
            _ = ticker.tick() => {}
        }

        let frame = tokio::select! {
            biased;
            _ = &mut shutdown => break,
            frame = render_current(cache) => frame,
        };
        emit(frame);
    }
}

/// Renders the full dashboard as text
pub fn render_dashboard(snapshot: &Snapshot, status: &CacheStatus) -> String {
    let mut out = String::new();

    render_status(&mut out, status);

    if let Some(error) = &snapshot.error {
        let _ = writeln!(out, "\nError: {error}");
    }

    if let Some(event) = &snapshot.next_event {
        let _ = writeln!(out, "\nNext Event: {}", event.name);
        render_event_details(&mut out, event);
    }

    if snapshot.standings.is_empty() {
        let _ = writeln!(out, "\nNo standings data available (beginning of season)");
    } else {
        let _ = writeln!(out, "\nTop 3 Drivers:");
        render_standings(&mut out, &snapshot.standings.drivers);
        let _ = writeln!(out, "\nTop 3 Constructors:");
        render_standings(&mut out, &snapshot.standings.constructors);
    }

    if let Some(event) = &snapshot.event_after_next {
        let _ = writeln!(out, "\nUpcoming: {}", event.name);
        render_event_details(&mut out, event);
    }

    if let Some(seconds) = snapshot.fetch_duration_seconds {
        let _ = writeln!(out, "\nData fetch took {:.1} minutes", seconds / 60.0);
    }

    out
}

fn render_status(out: &mut String, status: &CacheStatus) {
    let _ = writeln!(out, "Cache Status:");
    let _ = writeln!(out, "  - Has cached data: {}", status.has_data);
    let _ = writeln!(
        out,
        "  - Last update: {}",
        status
            .last_success_at
            .map(|at| at.to_rfc3339())
            .unwrap_or_else(|| "never".to_string())
    );
    if let Some(age) = status.age_hours {
        let _ = writeln!(out, "  - Cache age: {age:.1} hours");
    }
    let _ = writeln!(out, "  - Update in progress: {}", status.refresh_in_flight);
}

fn render_event_details(out: &mut String, event: &EventInfo) {
    let _ = writeln!(out, "Location: {}", event.location);
    match &event.time {
        Some(time) => {
            let _ = writeln!(out, "Date: {} at {}", event.date, time);
        }
        None => {
            let _ = writeln!(out, "Date: {}", event.date);
        }
    }
    if let Some(session) = &event.session_type {
        let _ = writeln!(out, "Type: {session}");
    }
    let _ = writeln!(out, "Round: {}", event.round);
}

fn render_standings(out: &mut String, entries: &[StandingEntry]) {
    for (i, entry) in entries.iter().enumerate() {
        let _ = writeln!(out, "  {}. {} - {} pts", i + 1, entry.name, entry.points);
    }
}
