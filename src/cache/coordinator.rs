//! Runs one refresh cycle at a time
//!
//! A cycle calls the three provider operations in sequence with a pause
//! between them, builds a new snapshot only if all three succeed, swaps it
//! into the cache state and then persists it. Failures leave the previous
//! snapshot in place.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::state::CacheState;
use super::store::SnapshotStore;
use crate::data::{DataProvider, ProviderError, Snapshot};

/// The provider operations of one refresh cycle, in call order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStep {
    NextEvent,
    Standings,
    EventAfterNext,
}

impl fmt::Display for FetchStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FetchStep::NextEvent => "next event",
            FetchStep::Standings => "standings",
            FetchStep::EventAfterNext => "event after next",
        };
        f.write_str(name)
    }
}

/// One failed provider call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchFailure {
    pub step: FetchStep,
    pub message: String,
}

impl fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.step, self.message)
    }
}

/// Result of asking for a refresh
#[derive(Debug)]
pub enum RefreshOutcome {
    /// A new snapshot was committed
    Updated(Arc<Snapshot>),
    /// Another refresh held the single-flight slot; nothing was done
    AlreadyRunning,
    /// At least one provider call failed; the previous snapshot was kept
    Failed(Vec<FetchFailure>),
}

impl RefreshOutcome {
    pub fn is_updated(&self) -> bool {
        matches!(self, RefreshOutcome::Updated(_))
    }
}

/// Orchestrates refresh cycles against the provider
pub struct RefreshCoordinator {
    provider: Arc<dyn DataProvider>,
    state: Arc<CacheState>,
    store: SnapshotStore,
    fetch_pause: Duration,
}

impl RefreshCoordinator {
    /// Creates a coordinator
    ///
    /// # Arguments
    /// * `provider` - Source of the three values that make up a snapshot
    /// * `state` - Shared cache state the coordinator commits into
    /// * `store` - Where successful snapshots are persisted
    /// * `fetch_pause` - Pause between consecutive provider calls
    pub fn new(
        provider: Arc<dyn DataProvider>,
        state: Arc<CacheState>,
        store: SnapshotStore,
        fetch_pause: Duration,
    ) -> Self {
        Self {
            provider,
            state,
            store,
            fetch_pause,
        }
    }

    /// The cache state this coordinator commits into
    pub fn state(&self) -> &Arc<CacheState> {
        &self.state
    }

    /// Runs a refresh cycle unless one is already in flight
    pub async fn refresh_once(&self) -> RefreshOutcome {
        let Some(_in_flight) = self.state.try_begin_refresh() else {
            info!("Update already in progress, skipping");
            return RefreshOutcome::AlreadyRunning;
        };

        let started = Instant::now();
        let now = Utc::now();
        let mut failures = Vec::new();
        info!("Fetching fresh F1 data");

        debug!("Getting next event");
        let next_event = record(
            FetchStep::NextEvent,
            self.provider.next_event(now).await,
            &mut failures,
        );
        tokio::time::sleep(self.fetch_pause).await;

        debug!("Getting current standings");
        let standings = record(
            FetchStep::Standings,
            self.provider.current_standings(now).await,
            &mut failures,
        );
        tokio::time::sleep(self.fetch_pause).await;

        debug!("Getting event after next");
        let event_after_next = record(
            FetchStep::EventAfterNext,
            self.provider.event_after_next(now).await,
            &mut failures,
        );

        let (Some(next_event), Some(standings), Some(event_after_next)) =
            (next_event, standings, event_after_next)
        else {
            error!(
                failed = failures.len(),
                "Failed to update data, keeping previous snapshot"
            );
            return RefreshOutcome::Failed(failures);
        };

        let fetch_duration = started.elapsed();
        let snapshot = Arc::new(Snapshot {
            next_event,
            standings,
            event_after_next,
            fetched_at: Utc::now(),
            fetch_duration_seconds: Some(fetch_duration.as_secs_f64()),
            error: None,
        });

        self.state.commit(Arc::clone(&snapshot));

        // Disk is only for restart recovery; the in-memory commit stands.
        if let Err(e) = self.store.save(&snapshot, snapshot.fetched_at) {
            warn!("Error saving cache: {}", e);
        }

        info!(
            duration_secs = fetch_duration.as_secs_f64(),
            "Data update completed"
        );
        RefreshOutcome::Updated(snapshot)
    }
}

fn record<T>(
    step: FetchStep,
    result: Result<T, ProviderError>,
    failures: &mut Vec<FetchFailure>,
) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            error!(%step, "Error fetching data: {}", e);
            failures.push(FetchFailure {
                step,
                message: e.to_string(),
            });
            None
        }
    }
}
