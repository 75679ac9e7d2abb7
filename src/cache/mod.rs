//! Background polling cache for dashboard data
//!
//! [`DashboardCache`] owns the process-wide cache state. On construction it
//! loads the persisted snapshot and spawns the background scheduler; the
//! presentation layer then reads through `get_data`, `get_status` and
//! `force_update`, and calls `stop` on shutdown.
//!
//! Stale data is always preferred over no data: a failed refresh keeps the
//! previous snapshot, and a cache that never fetched anything serves an
//! error-flagged placeholder instead of failing.

mod coordinator;
mod freshness;
mod scheduler;
mod state;
mod store;

pub use coordinator::{FetchFailure, FetchStep, RefreshCoordinator, RefreshOutcome};
pub use freshness::{age_hours, is_due};
pub use scheduler::{SchedulerConfig, SchedulerHandle};
pub use state::CacheState;
pub use store::{PersistedSnapshot, SnapshotStore, StoreError};

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::{CacheConfig, ConfigError};
use crate::data::{DataProvider, Snapshot, UNAVAILABLE_MESSAGE};

/// Errors returned by the cache facade
#[derive(Debug, Error)]
pub enum CacheError {
    /// The cache was configured with invalid values
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The operation is not available once `stop()` has been called
    #[error("Cache has been stopped")]
    Stopped,
}

/// Health of the cache, as reported to the presentation layer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStatus {
    /// Whether any snapshot is available
    pub has_data: bool,
    /// When data was last refreshed successfully
    pub last_success_at: Option<DateTime<Utc>>,
    /// Whether a refresh is running right now
    pub refresh_in_flight: bool,
    /// Whether the data is old enough to refresh
    pub is_due: bool,
    /// Age of the data in hours, one decimal place
    pub age_hours: Option<f64>,
}

/// Public face of the dashboard cache
pub struct DashboardCache {
    state: Arc<CacheState>,
    coordinator: Arc<RefreshCoordinator>,
    scheduler: Mutex<Option<SchedulerHandle>>,
    poll_interval: chrono::Duration,
    stop_timeout: Duration,
}

impl DashboardCache {
    /// Loads the persisted snapshot and starts background polling
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(config: CacheConfig, provider: Arc<dyn DataProvider>) -> Result<Self, CacheError> {
        config.validate()?;

        let store = SnapshotStore::new(config.cache_file.clone());
        let state = Arc::new(CacheState::new(store.load()));
        let coordinator = Arc::new(RefreshCoordinator::new(
            provider,
            Arc::clone(&state),
            store,
            config.fetch_pause,
        ));
        let scheduler =
            SchedulerHandle::spawn(Arc::clone(&coordinator), SchedulerConfig::from(&config));

        info!(
            poll_interval_hours = config.poll_interval_hours,
            cache_file = %config.cache_file.display(),
            "Started background polling"
        );

        Ok(Self {
            state,
            coordinator,
            scheduler: Mutex::new(Some(scheduler)),
            poll_interval: config.poll_interval(),
            stop_timeout: config.stop_timeout,
        })
    }

    /// Returns the current snapshot
    ///
    /// When nothing is cached yet this fetches synchronously first, or waits
    /// for a refresh already in progress. If no fetch has ever succeeded the
    /// result is a placeholder snapshot with `error` set.
    pub async fn get_data(&self) -> Arc<Snapshot> {
        if let Some(snapshot) = self.state.current() {
            return snapshot;
        }

        if !self.state.shutdown_requested() {
            info!("No cached data available, fetching immediately");
            if let RefreshOutcome::AlreadyRunning = self.coordinator.refresh_once().await {
                self.state.wait_until_idle().await;
            }
        }

        self.state.current().unwrap_or_else(|| {
            warn!("Unable to fetch data, returning empty dataset");
            Arc::new(Snapshot::unavailable(Utc::now(), UNAVAILABLE_MESSAGE))
        })
    }

    /// Runs a refresh now, on the caller's task
    ///
    /// If a refresh is already running this returns
    /// [`RefreshOutcome::AlreadyRunning`] immediately without waiting for it.
    pub async fn force_update(&self) -> Result<RefreshOutcome, CacheError> {
        if self.state.shutdown_requested() {
            return Err(CacheError::Stopped);
        }

        info!("Forcing immediate data update");
        Ok(self.coordinator.refresh_once().await)
    }

    /// Reports cache health without blocking or fetching
    pub fn get_status(&self) -> CacheStatus {
        let now = Utc::now();
        let last_success_at = self.state.last_success_at();

        CacheStatus {
            has_data: last_success_at.is_some(),
            last_success_at,
            refresh_in_flight: self.state.refresh_in_flight(),
            is_due: is_due(last_success_at, now, self.poll_interval),
            age_hours: last_success_at.map(|last| age_hours(last, now)),
        }
    }

    /// Whether `stop()` has been called
    pub fn is_stopped(&self) -> bool {
        self.state.shutdown_requested()
    }

    /// Stops background polling
    ///
    /// Waits up to the configured timeout for the scheduler to exit; a refresh
    /// cycle in progress is not aborted.
    pub async fn stop(&self) -> Result<(), CacheError> {
        let handle = self.scheduler.lock().take().ok_or(CacheError::Stopped)?;

        info!("Stopping background polling");
        self.state.request_shutdown();
        if handle.shutdown(self.stop_timeout).await {
            info!("Background polling stopped cleanly");
        }
        Ok(())
    }
}
