//! StateStore: the single owner of the presentation status snapshot.
//!
//! Every change goes through one merge operation.  After each merge the store
//! compares the `playing` flag before and after; a rising edge starts the
//! polling timer and a falling edge stops it.  Listeners are then notified in
//! registration order with a copy of the new snapshot.
//!
//! # Concurrency
//!
//! The internal lock guards plain data only.  It is never held across an
//! `.await` or while a listener runs, so a listener may call back into the
//! store (for example `get_state`) without deadlocking.
//!
//! Status refreshes may overlap: a polling tick and a command can both be
//! waiting on the presentation application at the same time.  Each refresh
//! draws a [`RefreshTicket`] before it starts; [`StateStore::apply_refresh`]
//! discards a result whose ticket is older than the last one applied.
//!
//! # Polling
//!
//! The polling timer is a tokio task that ticks at a fixed period and spawns
//! one refresh per tick.  Aborting the timer therefore stops future ticks but
//! never cancels a refresh that is already in flight; its result is still
//! applied when it arrives.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use async_trait::async_trait;
use keyosc_core::protocol::SequenceCounter;
use keyosc_core::{Snapshot, SnapshotUpdate};
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, warn};

/// A state-change listener reported a failure.
#[derive(Debug, Error)]
#[error("state listener failed: {0}")]
pub struct ListenerError(pub String);

/// Callback invoked with a copy of the snapshot after every change.
pub type StateListener = Arc<dyn Fn(&Snapshot) -> Result<(), ListenerError> + Send + Sync>;

/// Something that can re-query the presentation and write the result back
/// into the store.  The polling timer calls this once per tick.
#[async_trait]
pub trait StatusRefresher: Send + Sync {
    async fn refresh(&self);
}

/// What a change of the `playing` flag means for the polling timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollingTransition {
    Start,
    Stop,
    Unchanged,
}

/// Edge detection on the `playing` flag.
///
/// ```rust
/// use keyosc_bridge::application::state_store::{playing_transition, PollingTransition};
///
/// assert_eq!(playing_transition(false, true), PollingTransition::Start);
/// assert_eq!(playing_transition(true, true), PollingTransition::Unchanged);
/// ```
pub fn playing_transition(previous: bool, next: bool) -> PollingTransition {
    match (previous, next) {
        (false, true) => PollingTransition::Start,
        (true, false) => PollingTransition::Stop,
        _ => PollingTransition::Unchanged,
    }
}

/// Sequence number drawn before a status refresh starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RefreshTicket(u64);

impl RefreshTicket {
    pub fn sequence(&self) -> u64 {
        self.0
    }
}

/// Handle returned by [`StateStore::on_state_change`].
///
/// Dropping it leaves the listener registered; call
/// [`unsubscribe`](Self::unsubscribe) to remove it.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    store: Weak<StateStore>,
}

impl Subscription {
    /// Removes the listener.  Returns `false` if it was already gone.
    pub fn unsubscribe(self) -> bool {
        match self.store.upgrade() {
            Some(store) => store.remove_listener(self.id),
            None => false,
        }
    }
}

struct Inner {
    snapshot: Snapshot,
    listeners: Vec<(u64, StateListener)>,
    next_listener_id: u64,
    poll_interval: Duration,
    refresher: Option<Weak<dyn StatusRefresher>>,
    poll_task: Option<JoinHandle<()>>,
    last_applied: u64,
}

/// Owner of the [`Snapshot`], its listeners and the polling timer.
pub struct StateStore {
    inner: Mutex<Inner>,
    sequence: SequenceCounter,
}

impl StateStore {
    /// Creates a store holding the empty snapshot.
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner {
                snapshot: Snapshot::default(),
                listeners: Vec::new(),
                next_listener_id: 0,
                poll_interval,
                refresher: None,
                poll_task: None,
                last_applied: 0,
            }),
            sequence: SequenceCounter::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns a copy of the current snapshot.
    pub fn get_state(&self) -> Snapshot {
        self.lock().snapshot.clone()
    }

    pub fn is_polling(&self) -> bool {
        self.lock().snapshot.polling
    }

    pub fn poll_interval(&self) -> Duration {
        self.lock().poll_interval
    }

    /// Registers the refresher used when a rising `playing` edge starts
    /// polling.  Only a weak reference is kept.
    pub fn set_refresher(&self, refresher: &Arc<dyn StatusRefresher>) {
        self.lock().refresher = Some(Arc::downgrade(refresher));
    }

    /// Merges `update`, runs the polling side effect of a `playing` edge,
    /// notifies listeners and returns the resulting snapshot.
    pub fn update_state(&self, update: SnapshotUpdate) -> Snapshot {
        {
            let mut inner = self.lock();
            Self::commit(&mut inner, &update);
        }
        self.notify()
    }

    /// Draws the sequence number for a refresh that is about to start.
    pub fn begin_refresh(&self) -> RefreshTicket {
        RefreshTicket(self.sequence.next())
    }

    /// Applies the result of a refresh unless a refresh that started later
    /// has already been applied.
    ///
    /// Returns `None` when the result was discarded.
    pub fn apply_refresh(&self, ticket: RefreshTicket, update: SnapshotUpdate) -> Option<Snapshot> {
        {
            let mut inner = self.lock();
            if ticket.0 < inner.last_applied {
                debug!(
                    seq = ticket.0,
                    last_applied = inner.last_applied,
                    "discarding stale status refresh"
                );
                return None;
            }
            inner.last_applied = ticket.0;
            Self::commit(&mut inner, &update);
        }
        Some(self.notify())
    }

    /// Merges `update` and runs the polling side effect of a `playing` edge
    /// under the same guard, so `polling` never disagrees with `playing`
    /// after overlapping commits.
    fn commit(inner: &mut Inner, update: &SnapshotUpdate) {
        let previous = inner.snapshot.playing;
        inner.snapshot = inner.snapshot.merged(update);
        match playing_transition(previous, inner.snapshot.playing) {
            PollingTransition::Start => {
                debug!("slideshow started; starting status polling");
                let interval = inner.poll_interval;
                let refresher = inner.refresher.clone();
                Self::install_timer(inner, interval, refresher);
            }
            PollingTransition::Stop => {
                debug!("slideshow stopped; stopping status polling");
                Self::cancel_timer(inner);
            }
            PollingTransition::Unchanged => {}
        }
    }

    // ── Listeners ────────────────────────────────────────────────────────────

    /// Registers `listener`.  Listeners run in registration order.
    pub fn on_state_change<F>(self: &Arc<Self>, listener: F) -> Subscription
    where
        F: Fn(&Snapshot) -> Result<(), ListenerError> + Send + Sync + 'static,
    {
        let mut inner = self.lock();
        let id = inner.next_listener_id;
        inner.next_listener_id += 1;
        inner.listeners.push((id, Arc::new(listener)));
        Subscription {
            id,
            store: Arc::downgrade(self),
        }
    }

    fn remove_listener(&self, id: u64) -> bool {
        let mut inner = self.lock();
        let before = inner.listeners.len();
        inner.listeners.retain(|(existing, _)| *existing != id);
        inner.listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.lock().listeners.len()
    }

    /// Invokes every listener with a copy of the current snapshot.
    ///
    /// A listener that returns an error or panics is logged and skipped; the
    /// remaining listeners still run.
    pub fn notify_listeners(&self) {
        self.notify();
    }

    fn notify(&self) -> Snapshot {
        let (snapshot, listeners) = {
            let inner = self.lock();
            let listeners: Vec<StateListener> =
                inner.listeners.iter().map(|(_, l)| Arc::clone(l)).collect();
            (inner.snapshot.clone(), listeners)
        };

        for (index, listener) in listeners.iter().enumerate() {
            match catch_unwind(AssertUnwindSafe(|| listener(&snapshot))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(listener = index, error = %e, "state listener failed"),
                Err(_) => warn!(listener = index, "state listener panicked"),
            }
        }
        snapshot
    }

    // ── Polling lifecycle ────────────────────────────────────────────────────

    /// Starts the polling timer, replacing any timer already running.
    pub fn start_polling(&self, interval: Duration, refresher: &Arc<dyn StatusRefresher>) {
        let mut inner = self.lock();
        inner.poll_interval = interval;
        inner.refresher = Some(Arc::downgrade(refresher));
        let weak = inner.refresher.clone();
        Self::install_timer(&mut inner, interval, weak);
    }

    /// Cancels the timer if one is active.  Safe to call at any time.
    pub fn stop_polling(&self) {
        Self::cancel_timer(&mut self.lock());
    }

    fn cancel_timer(inner: &mut Inner) {
        if let Some(task) = inner.poll_task.take() {
            task.abort();
        }
        inner.snapshot.polling = false;
    }

    /// Changes the polling period, restarting an active timer.
    pub fn set_poll_interval(&self, interval: Duration) {
        let mut inner = self.lock();
        if inner.poll_interval == interval {
            return;
        }
        inner.poll_interval = interval;
        if inner.snapshot.polling {
            let refresher = inner.refresher.clone();
            Self::install_timer(&mut inner, interval, refresher);
        }
    }

    fn install_timer(
        inner: &mut Inner,
        interval: Duration,
        refresher: Option<Weak<dyn StatusRefresher>>,
    ) {
        if let Some(task) = inner.poll_task.take() {
            task.abort();
        }
        inner.snapshot.polling = true;

        let Some(refresher) = refresher else {
            warn!("polling enabled without a status refresher");
            return;
        };
        match Handle::try_current() {
            Ok(handle) => inner.poll_task = Some(handle.spawn(poll_loop(interval, refresher))),
            Err(_) => warn!("no async runtime; polling timer not started"),
        }
    }
}

impl Drop for StateStore {
    fn drop(&mut self) {
        let inner = self.inner.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(task) = inner.poll_task.take() {
            task.abort();
        }
    }
}

async fn poll_loop(period: Duration, refresher: Weak<dyn StatusRefresher>) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let Some(refresher) = refresher.upgrade() else {
            debug!("status refresher dropped; polling loop exiting");
            break;
        };
        tokio::spawn(async move { refresher.refresh().await });
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
