// SPDX-License-Identifier: MPL-2.0
//! Poll driving for watched pins.
//!
//! The [`WatchCoordinator`] owns the [`PinManager`] and a [`ThreadFetcher`].
//! Fetches run as owned futures off the coordinator's task; their results are
//! applied back on it, so pin and watcher state is only ever touched by the
//! coordinator. Poll cadence is the host's concern: a timer calls
//! [`WatchCoordinator::poll_all`] while watching is active and is disarmed
//! otherwise.

use crate::error::{Error, Result};
use crate::model::{Loadable, ThreadSnapshot};
use crate::watch::manager::PinManager;
use crate::watch::pin::PinId;
use crate::watch::watcher::ThreadDelta;
use futures_util::future::BoxFuture;
use std::sync::Arc;
use tracing::{debug, warn};

/// Fetches the current state of a thread.
///
/// Implementations return the full ordered post list or a classified failure.
pub trait ThreadFetcher: Send + Sync {
    fn fetch(&self, loadable: &Loadable) -> BoxFuture<'static, Result<ThreadSnapshot>>;
}

/// Outcome of one poll of one pin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// The poll completed and was applied.
    Updated(ThreadDelta),
    /// The pin was not eligible: errored, not watching, unknown, or a poll
    /// was already in flight.
    Skipped,
    /// The poll failed; terminal failures also flagged the pin.
    Failed(Error),
}

/// Drives polls for every watching pin and applies the results.
pub struct WatchCoordinator {
    manager: PinManager,
    fetcher: Arc<dyn ThreadFetcher>,
}

impl WatchCoordinator {
    pub fn new(manager: PinManager, fetcher: Arc<dyn ThreadFetcher>) -> Self {
        Self { manager, fetcher }
    }

    /// The owned pin manager.
    pub fn manager(&self) -> &PinManager {
        &self.manager
    }

    pub fn manager_mut(&mut self) -> &mut PinManager {
        &mut self.manager
    }

    /// Polls one pin now, regardless of cadence.
    ///
    /// At most one poll per pin is in flight: an ineligible or already-polling
    /// pin is skipped. A pin removed or paused while its fetch was in flight
    /// has the late result discarded rather than applied.
    pub async fn poll_now(&mut self, id: PinId) -> PollOutcome {
        let Some(fetch) = self.begin_fetch(id) else {
            return PollOutcome::Skipped;
        };

        let result = fetch.await;
        self.finish_poll(id, result)
    }

    /// Polls every watching pin, fetching concurrently and applying results
    /// on this task.
    pub async fn poll_all(&mut self) -> Vec<(PinId, PollOutcome)> {
        let ids = self.manager.watching_pin_ids();

        let mut fetches = Vec::new();
        for id in ids {
            if let Some(fetch) = self.begin_fetch(id) {
                fetches.push(async move { (id, fetch.await) });
            }
        }

        let results = futures_util::future::join_all(fetches).await;
        results
            .into_iter()
            .map(|(id, result)| (id, self.finish_poll(id, result)))
            .collect()
    }

    /// Starts a fetch for an eligible pin, marking its watcher as polling.
    fn begin_fetch(&mut self, id: PinId) -> Option<BoxFuture<'static, Result<ThreadSnapshot>>> {
        let (pin, watcher) = self.manager.pin_and_watcher_mut(id)?;
        if pin.is_error || !pin.watching {
            return None;
        }
        if !watcher.begin_poll() {
            return None;
        }
        let loadable = pin.loadable.clone();
        debug!(pin = %id, loadable = %loadable, "poll started");
        Some(self.fetcher.fetch(&loadable))
    }

    /// Applies a completed fetch. Results for pins that disappeared or were
    /// paused in the meantime are discarded.
    fn finish_poll(&mut self, id: PinId, result: Result<ThreadSnapshot>) -> PollOutcome {
        let Some((pin, watcher)) = self.manager.pin_and_watcher_mut(id) else {
            debug!(pin = %id, "poll result discarded, pin gone");
            return PollOutcome::Skipped;
        };

        let outcome = match result {
            Ok(snapshot) => {
                let delta = watcher.apply_thread(pin, &snapshot);
                PollOutcome::Updated(delta)
            }
            Err(error) => {
                warn!(pin = %id, %error, "poll failed");
                watcher.apply_error(pin, &error);
                PollOutcome::Failed(error)
            }
        };

        self.manager.notify_changed(id);
        outcome
    }
}

impl std::fmt::Debug for WatchCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchCoordinator")
            .field("manager", &self.manager)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Post;
    use crate::watch::pin::WatchFlags;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Serves canned snapshots per thread number and counts fetches.
    struct FakeFetcher {
        snapshots: Mutex<HashMap<u64, Result<ThreadSnapshot>>>,
        fetch_count: Mutex<usize>,
    }

    impl FakeFetcher {
        fn new() -> Self {
            Self {
                snapshots: Mutex::new(HashMap::new()),
                fetch_count: Mutex::new(0),
            }
        }

        fn serve(&self, thread_no: u64, result: Result<ThreadSnapshot>) {
            self.snapshots.lock().unwrap().insert(thread_no, result);
        }

        fn fetches(&self) -> usize {
            *self.fetch_count.lock().unwrap()
        }
    }

    impl ThreadFetcher for FakeFetcher {
        fn fetch(&self, loadable: &Loadable) -> BoxFuture<'static, Result<ThreadSnapshot>> {
            *self.fetch_count.lock().unwrap() += 1;
            let result = self
                .snapshots
                .lock()
                .unwrap()
                .get(&loadable.thread_no)
                .cloned()
                .unwrap_or(Err(Error::NotFound));
            Box::pin(async move { result })
        }
    }

    fn snapshot(nos: std::ops::RangeInclusive<u64>) -> ThreadSnapshot {
        ThreadSnapshot {
            posts: nos.map(|no| Post::new(no, "", "reply", no as i64)).collect(),
            archived: false,
            closed: false,
        }
    }

    fn coordinator_with(fetcher: Arc<FakeFetcher>) -> WatchCoordinator {
        WatchCoordinator::new(PinManager::new(), fetcher)
    }

    #[tokio::test]
    async fn poll_now_applies_fetched_snapshot() {
        let fetcher = Arc::new(FakeFetcher::new());
        fetcher.serve(100, Ok(snapshot(100..=105)));
        let mut coordinator = coordinator_with(Arc::clone(&fetcher));
        let id = coordinator
            .manager_mut()
            .create_pin(Loadable::new("4chan", "g", 100, "t"), WatchFlags::default());

        let outcome = coordinator.poll_now(id).await;

        assert_eq!(outcome, PollOutcome::Updated(ThreadDelta { new_posts: 0 }));
        let pin = coordinator.manager().pin(id).unwrap();
        assert_eq!(pin.watch_new_count, Some(6));
        assert_eq!(pin.last_loaded, 105);
    }

    #[tokio::test]
    async fn second_poll_reports_delta() {
        let fetcher = Arc::new(FakeFetcher::new());
        fetcher.serve(100, Ok(snapshot(100..=105)));
        let mut coordinator = coordinator_with(Arc::clone(&fetcher));
        let id = coordinator
            .manager_mut()
            .create_pin(Loadable::new("4chan", "g", 100, "t"), WatchFlags::default());

        coordinator.poll_now(id).await;
        fetcher.serve(100, Ok(snapshot(100..=109)));
        let outcome = coordinator.poll_now(id).await;

        assert_eq!(outcome, PollOutcome::Updated(ThreadDelta { new_posts: 4 }));
    }

    #[tokio::test]
    async fn not_found_flags_pin_and_later_polls_skip_it() {
        let fetcher = Arc::new(FakeFetcher::new());
        let mut coordinator = coordinator_with(Arc::clone(&fetcher));
        let id = coordinator
            .manager_mut()
            .create_pin(Loadable::new("4chan", "g", 404, "gone"), WatchFlags::default());

        let outcome = coordinator.poll_now(id).await;
        assert_eq!(outcome, PollOutcome::Failed(Error::NotFound));
        assert!(coordinator.manager().pin(id).unwrap().is_error);

        let outcome = coordinator.poll_now(id).await;
        assert_eq!(outcome, PollOutcome::Skipped);
        assert_eq!(fetcher.fetches(), 1);
    }

    #[tokio::test]
    async fn transient_failure_keeps_polling_on_cadence() {
        let fetcher = Arc::new(FakeFetcher::new());
        fetcher.serve(100, Err(Error::Network("reset".into())));
        let mut coordinator = coordinator_with(Arc::clone(&fetcher));
        let id = coordinator
            .manager_mut()
            .create_pin(Loadable::new("4chan", "g", 100, "t"), WatchFlags::default());

        let outcome = coordinator.poll_now(id).await;
        assert!(matches!(outcome, PollOutcome::Failed(Error::Network(_))));

        fetcher.serve(100, Ok(snapshot(100..=101)));
        let outcome = coordinator.poll_now(id).await;
        assert!(matches!(outcome, PollOutcome::Updated(_)));
    }

    #[tokio::test]
    async fn paused_pin_is_not_polled() {
        let fetcher = Arc::new(FakeFetcher::new());
        fetcher.serve(100, Ok(snapshot(100..=105)));
        let mut coordinator = coordinator_with(Arc::clone(&fetcher));
        let id = coordinator
            .manager_mut()
            .create_pin(Loadable::new("4chan", "g", 100, "t"), WatchFlags::default());
        coordinator.manager_mut().set_watching(id, false);

        assert_eq!(coordinator.poll_now(id).await, PollOutcome::Skipped);
        assert_eq!(fetcher.fetches(), 0);
    }

    #[tokio::test]
    async fn poll_all_covers_every_watching_pin() {
        let fetcher = Arc::new(FakeFetcher::new());
        fetcher.serve(1, Ok(snapshot(1..=3)));
        fetcher.serve(2, Ok(snapshot(2..=8)));
        let mut coordinator = coordinator_with(Arc::clone(&fetcher));
        let a = coordinator
            .manager_mut()
            .create_pin(Loadable::new("4chan", "g", 1, "a"), WatchFlags::default());
        let b = coordinator
            .manager_mut()
            .create_pin(Loadable::new("4chan", "g", 2, "b"), WatchFlags::default());
        let paused = coordinator
            .manager_mut()
            .create_pin(Loadable::new("4chan", "g", 3, "c"), WatchFlags::default());
        coordinator.manager_mut().set_watching(paused, false);

        let outcomes = coordinator.poll_all().await;

        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(|(id, _)| *id == a || *id == b));
        assert_eq!(fetcher.fetches(), 2);
    }

    #[tokio::test]
    async fn poll_emits_changed_event() {
        let fetcher = Arc::new(FakeFetcher::new());
        fetcher.serve(100, Ok(snapshot(100..=105)));
        let mut coordinator = coordinator_with(Arc::clone(&fetcher));
        let id = coordinator
            .manager_mut()
            .create_pin(Loadable::new("4chan", "g", 100, "t"), WatchFlags::default());

        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        coordinator
            .manager_mut()
            .subscribe(move |event| sink.lock().unwrap().push(event.clone()));

        coordinator.poll_now(id).await;

        use crate::watch::manager::PinEvent;
        assert_eq!(events.lock().unwrap().as_slice(), &[PinEvent::Changed(id)]);
    }
}
