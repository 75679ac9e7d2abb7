//! Background polling task
//!
//! One tokio task per cache instance. After an initial grace period it checks
//! the freshness policy at a fixed cadence and runs a refresh cycle when data
//! is due. Sleeps are cut into short slices so a shutdown request is noticed
//! within one slice even if the wake-up message is missed.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::FutureExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::coordinator::RefreshCoordinator;
use super::freshness;
use super::state::CacheState;
use crate::config::CacheConfig;

/// Timing of the background loop
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Delay before the first freshness check
    pub initial_delay: Duration,
    /// Time between freshness checks
    pub check_interval: Duration,
    /// Longest uninterrupted sleep
    pub sleep_slice: Duration,
    /// Back-off after a refresh cycle panicked
    pub error_cooldown: Duration,
    /// Age at which data becomes due for refresh
    pub poll_interval: chrono::Duration,
}

impl From<&CacheConfig> for SchedulerConfig {
    fn from(config: &CacheConfig) -> Self {
        Self {
            initial_delay: config.initial_delay,
            check_interval: config.check_interval,
            sleep_slice: config.sleep_slice,
            error_cooldown: config.error_cooldown,
            poll_interval: config.poll_interval(),
        }
    }
}

/// Handle for controlling the background polling task
pub struct SchedulerHandle {
    join: JoinHandle<()>,
    /// Wakes the task out of a slice sleep
    shutdown_tx: mpsc::Sender<()>,
}

impl SchedulerHandle {
    /// Spawns the polling loop on the current tokio runtime
    pub fn spawn(coordinator: Arc<RefreshCoordinator>, config: SchedulerConfig) -> Self {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);
        let join = tokio::spawn(run(coordinator, config, shutdown_rx));

        Self { join, shutdown_tx }
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wakes the task and waits up to `timeout` for it to exit
    ///
    /// The caller sets the shutdown flag first. A refresh cycle in progress is
    /// allowed to finish. Returns false if the task was still running when the
    /// timeout expired; it is then left to finish on its own.
    pub async fn shutdown(self, timeout: Duration) -> bool {
        let _ = self.shutdown_tx.try_send(());

        match tokio::time::timeout(timeout, self.join).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                error!("Background polling task failed: {}", e);
                true
            }
            Err(_) => {
                warn!(?timeout, "Background polling did not stop in time");
                false
            }
        }
    }
}

async fn run(
    coordinator: Arc<RefreshCoordinator>,
    config: SchedulerConfig,
    mut shutdown_rx: mpsc::Receiver<()>,
) {
    let state = Arc::clone(coordinator.state());
    info!(
        poll_interval_hours = config.poll_interval.num_hours(),
        "Background polling started"
    );

    if pause(&state, &mut shutdown_rx, config.initial_delay, config.sleep_slice).await {
        loop {
            if state.shutdown_requested() {
                break;
            }

            let mut wait = config.check_interval;
            if freshness::is_due(state.last_success_at(), Utc::now(), config.poll_interval) {
                info!("Scheduled data update starting");
                let attempt = AssertUnwindSafe(coordinator.refresh_once())
                    .catch_unwind()
                    .await;
                if attempt.is_err() {
                    error!(cooldown = ?config.error_cooldown, "Error in polling loop: refresh panicked");
                    wait = config.error_cooldown;
                }
            }

            if !pause(&state, &mut shutdown_rx, wait, config.sleep_slice).await {
                break;
            }
        }
    }

    info!("Background polling stopped");
}

/// Sleeps for `total` in slices of at most `slice`
///
/// Returns false as soon as shutdown is requested, the wake-up message
/// arrives, or the handle is dropped.
async fn pause(
    state: &CacheState,
    shutdown_rx: &mut mpsc::Receiver<()>,
    total: Duration,
    slice: Duration,
) -> bool {
    let mut remaining = total;
    while !remaining.is_zero() {
        if state.shutdown_requested() {
            return false;
        }

        let step = remaining.min(slice);
        tokio::select! {
            _ = tokio::time::sleep(step) => {}
            _ = shutdown_rx.recv() => return false,
        }
        remaining = remaining.saturating_sub(step);
    }

    !state.shutdown_requested()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::store::{PersistedSnapshot, SnapshotStore};
    use crate::data::provider::scripted::ScriptedProvider;
    use crate::data::{DataProvider, EventInfo, ProviderError, Snapshot, StandingsInfo};
    use async_trait::async_trait;
    use chrono::DateTime;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    fn config() -> SchedulerConfig {
        SchedulerConfig {
            initial_delay: Duration::from_secs(30),
            check_interval: Duration::from_secs(300),
            sleep_slice: Duration::from_secs(60),
            error_cooldown: Duration::from_secs(300),
            poll_interval: chrono::Duration::hours(12),
        }
    }

    fn coordinator_with(
        provider: Arc<dyn DataProvider>,
        state: Arc<CacheState>,
        temp_dir: &TempDir,
    ) -> Arc<RefreshCoordinator> {
        let store = SnapshotStore::new(temp_dir.path().join("dashboard_data.json"));
        Arc::new(RefreshCoordinator::new(provider, state, store, Duration::ZERO))
    }

    fn state_fetched_hours_ago(hours: i64) -> Arc<CacheState> {
        let fetched_at = Utc::now() - chrono::Duration::hours(hours);
        let snapshot = Snapshot {
            error: None,
            ..Snapshot::unavailable(fetched_at, "seed")
        };
        Arc::new(CacheState::new(Some(PersistedSnapshot {
            snapshot,
            last_update: fetched_at,
        })))
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_check_waits_for_initial_delay() {
        let temp_dir = TempDir::new().unwrap();
        let provider = Arc::new(ScriptedProvider::new());
        let state = Arc::new(CacheState::new(None));
        let coordinator = coordinator_with(provider.clone(), Arc::clone(&state), &temp_dir);

        let handle = SchedulerHandle::spawn(coordinator, config());

        tokio::time::sleep(Duration::from_secs(29)).await;
        assert_eq!(provider.total_calls(), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(provider.total_calls(), 3);
        assert!(state.current().is_some());

        state.request_shutdown();
        assert!(handle.shutdown(Duration::from_secs(5)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fresh_data_is_not_refreshed() {
        let temp_dir = TempDir::new().unwrap();
        let provider = Arc::new(ScriptedProvider::new());
        let state = state_fetched_hours_ago(1);
        let coordinator = coordinator_with(provider.clone(), Arc::clone(&state), &temp_dir);

        let handle = SchedulerHandle::spawn(coordinator, config());
        tokio::time::sleep(Duration::from_secs(3600)).await;

        assert_eq!(provider.total_calls(), 0);
        state.request_shutdown();
        assert!(handle.shutdown(Duration::from_secs(5)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_data_is_refreshed_once() {
        let temp_dir = TempDir::new().unwrap();
        let provider = Arc::new(ScriptedProvider::new());
        let state = state_fetched_hours_ago(13);
        let coordinator = coordinator_with(provider.clone(), Arc::clone(&state), &temp_dir);

        let handle = SchedulerHandle::spawn(coordinator, config());
        // Twelve check intervals; only the first finds the data due.
        tokio::time::sleep(Duration::from_secs(3600)).await;

        assert_eq!(provider.total_calls(), 3);
        assert!(state.current().unwrap().error.is_none());
        state.request_shutdown();
        assert!(handle.shutdown(Duration::from_secs(5)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_flag_is_noticed_within_one_slice() {
        let temp_dir = TempDir::new().unwrap();
        let provider = Arc::new(ScriptedProvider::new());
        let state = state_fetched_hours_ago(1);
        let coordinator = coordinator_with(provider, Arc::clone(&state), &temp_dir);
        let config = SchedulerConfig {
            check_interval: Duration::from_secs(5 * 3600),
            ..config()
        };

        let handle = SchedulerHandle::spawn(coordinator, config);
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert!(!handle.is_finished());

        // Flag only, no wake-up message.
        state.request_shutdown();
        tokio::time::sleep(Duration::from_secs(61)).await;

        assert!(handle.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_interrupts_initial_delay() {
        let temp_dir = TempDir::new().unwrap();
        let provider = Arc::new(ScriptedProvider::new());
        let state = Arc::new(CacheState::new(None));
        let coordinator = coordinator_with(provider.clone(), Arc::clone(&state), &temp_dir);

        let handle = SchedulerHandle::spawn(coordinator, config());
        tokio::time::sleep(Duration::from_secs(5)).await;

        state.request_shutdown();
        assert!(handle.shutdown(Duration::from_secs(1)).await);
        assert_eq!(provider.total_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_lets_in_flight_refresh_finish() {
        let temp_dir = TempDir::new().unwrap();
        let provider = Arc::new(ScriptedProvider::new().with_latency(Duration::from_secs(20)));
        let state = Arc::new(CacheState::new(None));
        let coordinator = coordinator_with(provider.clone(), Arc::clone(&state), &temp_dir);

        let handle = SchedulerHandle::spawn(coordinator, config());
        // Inside the first provider call.
        tokio::time::sleep(Duration::from_secs(35)).await;
        assert!(state.refresh_in_flight());

        state.request_shutdown();
        assert!(handle.shutdown(Duration::from_secs(120)).await);

        assert!(!state.refresh_in_flight());
        assert!(state.current().is_some());
        assert_eq!(provider.total_calls(), 3);
    }

    /// Panics on its first call, then behaves.
    #[derive(Default)]
    struct PanicOnceProvider {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl DataProvider for PanicOnceProvider {
        async fn next_event(&self, _now: DateTime<Utc>) -> Result<Option<EventInfo>, ProviderError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("provider bug");
            }
            Ok(None)
        }

        async fn current_standings(&self, _now: DateTime<Utc>) -> Result<StandingsInfo, ProviderError> {
            Ok(StandingsInfo::default())
        }

        async fn event_after_next(
            &self,
            _now: DateTime<Utc>,
        ) -> Result<Option<EventInfo>, ProviderError> {
            Ok(None)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_refresh_backs_off_and_retries() {
        let temp_dir = TempDir::new().unwrap();
        let provider = Arc::new(PanicOnceProvider::default());
        let state = Arc::new(CacheState::new(None));
        let coordinator = coordinator_with(provider.clone(), Arc::clone(&state), &temp_dir);

        let handle = SchedulerHandle::spawn(coordinator, config());

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        assert!(!state.refresh_in_flight());
        assert!(state.current().is_none());

        // Still cooling down.
        tokio::time::sleep(Duration::from_secs(200)).await;
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
        assert!(state.current().is_some());
        assert!(!handle.is_finished());

        state.request_shutdown();
        assert!(handle.shutdown(Duration::from_secs(5)).await);
    }

    #[test]
    fn test_scheduler_config_from_cache_config() {
        let cache_config = CacheConfig {
            poll_interval_hours: 6,
            ..CacheConfig::default()
        };

        let config = SchedulerConfig::from(&cache_config);

        assert_eq!(config.poll_interval, chrono::Duration::hours(6));
        assert_eq!(config.initial_delay, cache_config.initial_delay);
        assert_eq!(config.sleep_slice, cache_config.sleep_slice);
    }
}
