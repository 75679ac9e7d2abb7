//! Shared state of one dashboard cache instance
//!
//! The committed snapshot is swapped as a whole behind a lock, so readers see
//! either the previous value or the new one. The single-flight flag lives in a
//! `watch` channel: claiming it is one atomic check-and-set, and callers can
//! await the end of a refresh without polling.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::sync::watch;

use super::store::PersistedSnapshot;
use crate::data::Snapshot;

/// The last known-good snapshot and when it was obtained
#[derive(Debug)]
struct Committed {
    snapshot: Arc<Snapshot>,
    last_success_at: DateTime<Utc>,
}

/// Process-wide cache state, owned by the facade
#[derive(Debug)]
pub struct CacheState {
    committed: RwLock<Option<Committed>>,
    in_flight: watch::Sender<bool>,
    shutdown_requested: AtomicBool,
}

impl CacheState {
    /// Creates the state, seeded from a persisted snapshot when one exists
    pub fn new(initial: Option<PersistedSnapshot>) -> Self {
        let committed = initial.map(|persisted| Committed {
            snapshot: Arc::new(persisted.snapshot),
            last_success_at: persisted.last_update,
        });
        let (in_flight, _) = watch::channel(false);

        Self {
            committed: RwLock::new(committed),
            in_flight,
            shutdown_requested: AtomicBool::new(false),
        }
    }

    /// Returns the committed snapshot, if any
    ///
    /// The `Arc` is cloned under a short read lock, so callers keep a stable
    /// value even if a refresh commits a new one right after.
    pub fn current(&self) -> Option<Arc<Snapshot>> {
        self.committed.read().as_ref().map(|c| Arc::clone(&c.snapshot))
    }

    /// When the committed snapshot was obtained
    pub fn last_success_at(&self) -> Option<DateTime<Utc>> {
        self.committed.read().as_ref().map(|c| c.last_success_at)
    }

    /// Replaces the committed snapshot; only the holder of the in-flight
    /// guard calls this
    pub(crate) fn commit(&self, snapshot: Arc<Snapshot>) {
        let last_success_at = snapshot.fetched_at;
        *self.committed.write() = Some(Committed {
            snapshot,
            last_success_at,
        });
    }

    /// Whether a refresh cycle currently holds the single-flight slot
    pub fn refresh_in_flight(&self) -> bool {
        *self.in_flight.borrow()
    }

    /// Claims the single-flight slot, or returns `None` if a refresh is
    /// already running
    pub(crate) fn try_begin_refresh(&self) -> Option<InFlightGuard<'_>> {
        let claimed = self.in_flight.send_if_modified(|busy| {
            if *busy {
                false
            } else {
                *busy = true;
                true
            }
        });
        claimed.then_some(InFlightGuard { state: self })
    }

    /// Resolves once no refresh is running
    pub async fn wait_until_idle(&self) {
        let mut rx = self.in_flight.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|busy| !*busy).await;
    }

    /// Marks the cache as stopping
    ///
    /// The scheduler checks this between sleep slices; facade operations
    /// that would start a fetch check it too.
    pub fn request_shutdown(&self) {
        self.shutdown_requested.store(true, Ordering::SeqCst);
    }

    /// Whether `request_shutdown` has been called
    pub fn shutdown_requested(&self) -> bool {
        self.shutdown_requested.load(Ordering::SeqCst)
    }
}

/// Holds the single-flight slot; releases it on drop, including on panic
#[derive(Debug)]
pub(crate) struct InFlightGuard<'a> {
    state: &'a CacheState,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.state.in_flight.send_replace(false);
    }
}
