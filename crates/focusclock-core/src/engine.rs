//! Clock engine.
//!
//! Owns the in-memory [`ClockState`] and is its single writer. User actions
//! go through the reducer; expiry goes through the completion detector.
//! Every committed change is queued for one save on the active backend
//! inside the same critical section that commits it, so the queue order is
//! the commit order. Saves and history appends run on a dedicated writer
//! task in that order; callers and periodic passes never wait on I/O.
//!
//! A backend only receives saves once a load from it has succeeded (or it
//! has pushed a document). Until then the engine runs from memory.
//!
//! ```text
//! action ──reduce──▶ state ──queue──▶ writer ──save──▶ backend
//!                      ▲                                  │
//!                      └──────── replace wholesale ◀──push┘
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::activity::{ActivityEvent, ActivityLog};
use crate::backend::{AuthStatus, BackendKind, BackendSelector, PersistenceBackend, Subscription};
use crate::clock::{SystemClock, TimeSource};
use crate::completion::{Completion, CompletionDetector};
use crate::error::{StoreError, ValidationError};
use crate::events::Event;
use crate::history::{self, CompletedFocusEntry, HistoryLog, HistorySummary};
use crate::reducer::{reduce, Action, ReduceContext};
use crate::state::ClockState;
use crate::storage::{Config, TickerConfig};
use crate::ticker::{DisplaySnapshot, TickerHandle};

enum WriteJob {
    Save {
        backend: Arc<dyn PersistenceBackend>,
        state: ClockState,
    },
    Append {
        entry: CompletedFocusEntry,
        cloud_backed: bool,
    },
    Flush(oneshot::Sender<()>),
}

/// State and the backend it belongs to, always changed together.
struct Active {
    state: ClockState,
    backend: Arc<dyn PersistenceBackend>,
    kind: BackendKind,
    /// Bumped on every backend switch; pushes tagged with an older value
    /// are dropped.
    generation: u64,
    /// False until `backend` has been loaded or has pushed. Saves are held back
    /// while false so a state the backend never produced cannot
    /// overwrite its document.
    loaded: bool,
}

impl Active {
    fn save_job(&self) -> Option<WriteJob> {
        if !self.loaded {
            debug!("{} store not loaded, holding save back", self.kind.as_str());
            return None;
        }
        Some(WriteJob::Save {
            backend: self.backend.clone(),
            state: self.state.clone(),
        })
    }
}

struct EngineInner {
    active: Mutex<Active>,
    subscription: Mutex<Option<Subscription>>,
    switching: tokio::sync::Mutex<()>,
    clock: Arc<dyn TimeSource>,
    history: Arc<dyn HistoryLog>,
    ctx: ReduceContext,
    detector: CompletionDetector,
    ticker: TickerConfig,
    activity: ActivityLog,
    writes: mpsc::UnboundedSender<WriteJob>,
    display: watch::Sender<DisplaySnapshot>,
}

/// Builder for [`ClockEngine`].
pub struct EngineBuilder {
    backend: Arc<dyn PersistenceBackend>,
    history: Arc<dyn HistoryLog>,
    clock: Arc<dyn TimeSource>,
    config: Config,
    activity: Option<mpsc::UnboundedSender<ActivityEvent>>,
}

impl EngineBuilder {
    pub fn clock(mut self, clock: Arc<dyn TimeSource>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Receive an [`ActivityEvent`] for every action, completion and
    /// persistence failure.
    pub fn activity(mut self, sink: mpsc::UnboundedSender<ActivityEvent>) -> Self {
        self.activity = Some(sink);
        self
    }

    /// Build the engine, load state from the backend and subscribe to its
    /// pushes. Must be called inside a tokio runtime.
    ///
    /// The engine is returned even when the load fails; it then starts
    /// from configured defaults and the load error comes alongside.
    pub async fn start(self) -> (ClockEngine, Result<(), StoreError>) {
        let backend = self.backend.clone();
        let engine = self.build();
        let loaded = engine.switch_backend(backend).await;
        (engine, loaded)
    }

    fn build(self) -> ClockEngine {
        let defaults = ClockState::with_defaults(
            self.config.focus.default_minutes,
            self.config.countdown.default_seconds,
        );
        let now = self.clock.now_ms();
        let activity = ActivityLog::new(self.activity);
        let (writes, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_writer(rx, self.history.clone(), activity.clone(), self.clock.clone()));
        let (display, _) = watch::channel(DisplaySnapshot::derive(&defaults, now));
        let kind = self.backend.kind();

        ClockEngine {
            inner: Arc::new(EngineInner {
                active: Mutex::new(Active {
                    state: defaults,
                    backend: self.backend,
                    kind,
                    generation: 0,
                    loaded: false,
                }),
                subscription: Mutex::new(None),
                switching: tokio::sync::Mutex::new(()),
                clock: self.clock,
                history: self.history,
                ctx: ReduceContext {
                    countdown_default_seconds: self.config.countdown.default_seconds,
                },
                detector: CompletionDetector::new(self.config.focus.label.clone()),
                ticker: self.config.ticker.clone(),
                activity,
                writes,
                display,
            }),
        }
    }
}

/// Handle to the clock engine. Clones share the same state.
#[derive(Clone)]
pub struct ClockEngine {
    inner: Arc<EngineInner>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // Critical sections only assign and enqueue, so a poisoned lock still
    // holds a consistent value.
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ClockEngine {
    pub fn builder(
        backend: Arc<dyn PersistenceBackend>,
        history: Arc<dyn HistoryLog>,
    ) -> EngineBuilder {
        EngineBuilder {
            backend,
            history,
            clock: Arc::new(SystemClock),
            config: Config::default(),
            activity: None,
        }
    }

    // ── Projections ──────────────────────────────────────────────────

    /// Raw state as of now.
    pub fn state(&self) -> ClockState {
        lock(&self.inner.active).state.clone()
    }

    pub fn now_ms(&self) -> u64 {
        self.inner.clock.now_ms()
    }

    pub fn remaining_focus_seconds(&self) -> u64 {
        lock(&self.inner.active)
            .state
            .focus
            .remaining_seconds(self.now_ms())
    }

    pub fn remaining_timer_seconds(&self) -> u64 {
        lock(&self.inner.active)
            .state
            .countdown
            .remaining_seconds(self.now_ms())
    }

    pub fn stopwatch_elapsed_ms(&self) -> u64 {
        lock(&self.inner.active).state.stopwatch.elapsed_ms(self.now_ms())
    }

    pub fn display(&self) -> DisplaySnapshot {
        DisplaySnapshot::derive(&lock(&self.inner.active).state, self.now_ms())
    }

    /// Snapshots published by the display pass while ticking.
    pub fn watch_display(&self) -> watch::Receiver<DisplaySnapshot> {
        self.inner.display.subscribe()
    }

    pub fn backend_kind(&self) -> BackendKind {
        lock(&self.inner.active).kind
    }

    /// Whether the active backend has been loaded and receives saves.
    pub fn is_loaded(&self) -> bool {
        lock(&self.inner.active).loaded
    }

    // ── Actions ──────────────────────────────────────────────────────

    pub fn start_focus(&self) -> Vec<Event> {
        self.dispatch(Action::StartFocus).unwrap_or_default()
    }

    pub fn pause_focus(&self) -> Vec<Event> {
        self.dispatch(Action::PauseFocus).unwrap_or_default()
    }

    pub fn reset_focus(&self) -> Vec<Event> {
        self.dispatch(Action::ResetFocus).unwrap_or_default()
    }

    /// # Errors
    /// Rejected while a session is running or for a zero duration.
    pub fn set_focus_duration(&self, minutes: u32) -> Result<Vec<Event>, ValidationError> {
        self.dispatch(Action::SetFocusDuration(minutes))
    }

    /// Start or resume the countdown; a given duration replaces the stored
    /// one.
    ///
    /// # Errors
    /// Rejected when there is nothing left to count down.
    pub fn start_timer(&self, duration_seconds: Option<u64>) -> Result<Vec<Event>, ValidationError> {
        self.dispatch(Action::StartTimer(duration_seconds))
    }

    pub fn pause_timer(&self) -> Vec<Event> {
        self.dispatch(Action::PauseTimer).unwrap_or_default()
    }

    pub fn reset_timer(&self) -> Vec<Event> {
        self.dispatch(Action::ResetTimer).unwrap_or_default()
    }

    pub fn toggle_stopwatch(&self) -> Vec<Event> {
        self.dispatch(Action::ToggleStopwatch).unwrap_or_default()
    }

    pub fn lap_stopwatch(&self) -> Vec<Event> {
        self.dispatch(Action::LapStopwatch).unwrap_or_default()
    }

    pub fn reset_stopwatch(&self) -> Vec<Event> {
        self.dispatch(Action::ResetStopwatch).unwrap_or_default()
    }

    /// Apply one action. Anything already due completes first, so an
    /// expired session is logged before an action can restart it.
    pub fn dispatch(&self, action: Action) -> Result<Vec<Event>, ValidationError> {
        let now = self.now_ms();
        let mut events = self
            .check_completion_at(now)
            .map(|c| c.events)
            .unwrap_or_default();

        let (applied, cloud_backed) = {
            let mut active = lock(&self.inner.active);
            let transition = reduce(&active.state, action, now, &self.inner.ctx)?;
            if !transition.changed() {
                return Ok(events);
            }
            active.state = transition.state;
            if let Some(job) = active.save_job() {
                self.queue(job);
            }
            (transition.events, active.kind.is_cloud())
        };

        self.report(&applied, cloud_backed);
        events.extend(applied);
        Ok(events)
    }

    // ── Completion ───────────────────────────────────────────────────

    /// One completion pass against the current time.
    pub fn check_completion(&self) -> Option<Completion> {
        self.check_completion_at(self.now_ms())
    }

    fn check_completion_at(&self, now: u64) -> Option<Completion> {
        let (completion, cloud_backed) = {
            let mut active = lock(&self.inner.active);
            let completion = self.inner.detector.poll(&active.state, now)?;
            active.state = completion.state.clone();
            let cloud_backed = active.kind.is_cloud();
            if let Some(job) = active.save_job() {
                self.queue(job);
            }
            if let Some(entry) = &completion.entry {
                self.queue(WriteJob::Append {
                    entry: entry.clone(),
                    cloud_backed,
                });
            }
            (completion, cloud_backed)
        };

        self.report(&completion.events, cloud_backed);
        Some(completion)
    }

    // ── Persistence ──────────────────────────────────────────────────

    fn queue(&self, job: WriteJob) {
        if self.inner.writes.send(job).is_err() {
            debug!("writer task gone, dropping write");
        }
    }

    fn report(&self, events: &[Event], cloud_backed: bool) {
        for event in events {
            self.inner
                .activity
                .record(ActivityEvent::from_event(event, cloud_backed));
        }
    }

    /// Wait until every write queued so far has been attempted.
    pub async fn flush(&self) {
        let (done, wait) = oneshot::channel();
        self.queue(WriteJob::Flush(done));
        let _ = wait.await;
    }

    /// Load from `backend`, replace the in-memory state wholesale and
    /// subscribe to its pushes. The previous subscription is cancelled
    /// first; a mutation that had not reached the old backend is dropped,
    /// never merged.
    ///
    /// # Errors
    /// If loading fails the engine still points at `backend` and listens
    /// to it, but keeps its in-memory state and saves nothing there until
    /// a later switch loads successfully or the backend pushes a document.
    pub async fn switch_backend(
        &self,
        backend: Arc<dyn PersistenceBackend>,
    ) -> Result<(), StoreError> {
        let _switching = self.inner.switching.lock().await;

        if let Some(previous) = lock(&self.inner.subscription).take() {
            previous.cancel();
        }

        let kind = backend.kind();
        let generation = {
            let mut active = lock(&self.inner.active);
            active.generation += 1;
            active.backend = backend.clone();
            active.kind = kind;
            active.loaded = false;
            active.generation
        };

        let loaded = backend.load().await;
        match &loaded {
            Ok(state) => {
                {
                    let mut active = lock(&self.inner.active);
                    active.state = state.clone();
                    active.loaded = true;
                }
                self.report(
                    &[Event::StateReplaced {
                        backend: kind,
                        at: self.inner.clock.now_utc(),
                    }],
                    kind.is_cloud(),
                );
            }
            Err(e) => {
                self.inner.activity.record(ActivityEvent::warning(
                    "sync",
                    format!("Loading from {} store failed: {e}", kind.as_str()),
                    kind.is_cloud(),
                    self.inner.clock.now_utc(),
                ));
            }
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let subscription = backend.subscribe(tx);
        tokio::spawn(apply_pushes(
            Arc::downgrade(&self.inner),
            generation,
            kind,
            rx,
        ));
        *lock(&self.inner.subscription) = Some(subscription);

        loaded.map(|_| ())
    }

    /// Follow the authentication signal: switch to the selected backend now
    /// and on every change, until the sender is dropped.
    pub fn follow_auth(
        &self,
        selector: BackendSelector,
        mut auth: watch::Receiver<AuthStatus>,
    ) -> JoinHandle<()> {
        let engine = self.clone();
        tokio::spawn(async move {
            loop {
                let status = auth.borrow_and_update().clone();
                debug!("auth status {status:?}");
                // Failures are already reported through the activity log.
                let _ = engine.switch_backend(selector.select(&status)).await;
                if auth.changed().await.is_err() {
                    break;
                }
            }
        })
    }

    // ── History ──────────────────────────────────────────────────────

    /// Every logged session, after pending appends have landed.
    pub async fn history_entries(&self) -> Result<Vec<CompletedFocusEntry>, StoreError> {
        self.flush().await;
        self.inner.history.entries().await
    }

    pub async fn history_summary(&self) -> Result<HistorySummary, StoreError> {
        let entries = self.history_entries().await?;
        Ok(history::summarize(&entries, self.inner.clock.now_utc()))
    }

    // ── Ticking ──────────────────────────────────────────────────────

    /// Spawn the display and completion passes.
    pub fn start_ticking(&self) -> TickerHandle {
        let cancel = CancellationToken::new();

        let display = {
            let engine = self.clone();
            let cancel = cancel.clone();
            let period = self.inner.ticker.ui_refresh();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(period);
                interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                loop {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break,
                        _ = interval.tick() => {
                            engine.inner.display.send_replace(engine.display());
                        }
                    }
                }
            })
        };

        let completion = {
            let engine = self.clone();
            let cancel = cancel.clone();
            let period = self.inner.ticker.completion_check();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(period);
                interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                loop {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break,
                        _ = interval.tick() => {
                            engine.check_completion();
                        }
                    }
                }
            })
        };

        TickerHandle::new(cancel, vec![display, completion])
    }
}

async fn apply_pushes(
    engine: Weak<EngineInner>,
    generation: u64,
    kind: BackendKind,
    mut rx: mpsc::UnboundedReceiver<ClockState>,
) {
    while let Some(pushed) = rx.recv().await {
        let Some(inner) = engine.upgrade() else {
            break;
        };
        {
            let mut active = lock(&inner.active);
            if active.generation != generation {
                debug!("dropping push from abandoned {} store", kind.as_str());
                break;
            }
            active.state = pushed;
            active.loaded = true;
        }
        let event = Event::StateReplaced {
            backend: kind,
            at: inner.clock.now_utc(),
        };
        inner
            .activity
            .record(ActivityEvent::from_event(&event, kind.is_cloud()));
    }
}

async fn run_writer(
    mut rx: mpsc::UnboundedReceiver<WriteJob>,
    history: Arc<dyn HistoryLog>,
    activity: ActivityLog,
    clock: Arc<dyn TimeSource>,
) {
    while let Some(job) = rx.recv().await {
        match job {
            WriteJob::Save { backend, state } => {
                if let Err(e) = backend.save(&state).await {
                    let kind = backend.kind();
                    activity.record(ActivityEvent::warning(
                        "sync",
                        format!("Saving to {} store failed: {e}", kind.as_str()),
                        kind.is_cloud(),
                        clock.now_utc(),
                    ));
                }
            }
            WriteJob::Append {
                entry,
                cloud_backed,
            } => {
                if let Err(e) = history.append(entry).await {
                    activity.record(ActivityEvent::warning(
                        "history",
                        format!("Recording focus session failed: {e}"),
                        cloud_backed,
                        clock.now_utc(),
                    ));
                }
            }
            WriteJob::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MemoryTransport, RemoteSyncStore};
    use crate::clock::ManualClock;
    use crate::history::MemoryHistory;
    use async_trait::async_trait;
    use std::time::Duration;

    const T0: u64 = 1_700_000_000_000;

    struct Harness {
        engine: ClockEngine,
        clock: ManualClock,
        history: Arc<MemoryHistory>,
        hub: MemoryTransport,
    }

    async fn harness() -> Harness {
        let clock = ManualClock::new(T0);
        let history = Arc::new(MemoryHistory::new());
        let hub = MemoryTransport::new();
        let backend = Arc::new(RemoteSyncStore::new(Arc::new(hub.clone()), "u1"));
        let (engine, loaded) = ClockEngine::builder(backend, history.clone())
            .clock(Arc::new(clock.clone()))
            .start()
            .await;
        loaded.unwrap();
        Harness {
            engine,
            clock,
            history,
            hub,
        }
    }

    /// Remote store that is offline for saves, and for loads unless
    /// `loads` is set.
    struct FailingStore {
        loads: bool,
    }

    #[async_trait]
    impl PersistenceBackend for FailingStore {
        fn kind(&self) -> BackendKind {
            BackendKind::Remote
        }

        async fn load(&self) -> Result<ClockState, StoreError> {
            if self.loads {
                Ok(ClockState::default())
            } else {
                Err(StoreError::Unavailable("offline".into()))
            }
        }

        async fn save(&self, _state: &ClockState) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("offline".into()))
        }

        fn subscribe(&self, _sink: crate::backend::StateSink) -> Subscription {
            Subscription::inert()
        }
    }

    async fn engine_with_activity(
        store: FailingStore,
    ) -> (ClockEngine, Result<(), StoreError>, mpsc::UnboundedReceiver<ActivityEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (engine, loaded) =
            ClockEngine::builder(Arc::new(store), Arc::new(MemoryHistory::new()))
                .clock(Arc::new(ManualClock::new(T0)))
                .activity(tx)
                .start()
                .await;
        (engine, loaded, rx)
    }

    fn count_warnings(rx: &mut mpsc::UnboundedReceiver<ActivityEvent>) -> usize {
        let mut warnings = 0;
        while let Ok(activity) = rx.try_recv() {
            if activity.severity == crate::activity::Severity::Warning {
                assert!(activity.cloud_backed);
                warnings += 1;
            }
        }
        warnings
    }

    #[tokio::test]
    async fn actions_persist_to_backend() {
        let h = harness().await;
        h.engine.start_timer(Some(90)).unwrap();
        h.engine.flush().await;

        let stored = RemoteSyncStore::new(Arc::new(h.hub.clone()), "u1")
            .load()
            .await
            .unwrap();
        assert!(stored.countdown.is_running);
        assert_eq!(stored.countdown.end_time, Some(T0 + 90_000));
    }

    #[tokio::test]
    async fn projections_follow_the_clock() {
        let h = harness().await;
        h.engine.start_focus();
        h.engine.start_timer(Some(300)).unwrap();
        h.engine.toggle_stopwatch();
        h.clock.advance_ms(10_500);

        assert_eq!(h.engine.remaining_focus_seconds(), 25 * 60 - 10);
        assert_eq!(h.engine.remaining_timer_seconds(), 290);
        assert_eq!(h.engine.stopwatch_elapsed_ms(), 10_500);
    }

    #[tokio::test]
    async fn completion_logs_exactly_once() {
        let h = harness().await;
        h.engine.start_focus();
        h.clock.advance_secs(25 * 60 + 1);

        let done = h.engine.check_completion().unwrap();
        assert!(done.focus_completed());
        assert!(h.engine.check_completion().is_none());
        h.engine.flush().await;
        assert_eq!(h.history.len(), 1);
        assert!(!h.engine.state().focus.is_active);
    }

    #[tokio::test]
    async fn action_on_expired_session_logs_it_first() {
        let h = harness().await;
        h.engine.start_focus();
        h.clock.advance_secs(26 * 60);

        let events = h.engine.start_focus();
        assert!(matches!(events[0], Event::FocusCompleted { .. }));
        assert!(matches!(events[1], Event::FocusStarted { .. }));
        h.engine.flush().await;
        assert_eq!(h.history.len(), 1);
    }

    #[tokio::test]
    async fn manual_pause_logs_nothing() {
        let h = harness().await;
        h.engine.start_focus();
        h.clock.advance_secs(60);
        h.engine.pause_focus();
        h.clock.advance_secs(60 * 60);
        assert!(h.engine.check_completion().is_none());
        h.engine.flush().await;
        assert!(h.history.is_empty());
    }

    #[tokio::test]
    async fn noop_action_reports_nothing() {
        let h = harness().await;
        h.engine.start_focus();
        assert!(h.engine.start_focus().is_empty());
    }

    #[tokio::test]
    async fn failed_save_is_reported_and_state_kept() {
        let (engine, loaded, mut rx) = engine_with_activity(FailingStore { loads: true }).await;
        loaded.unwrap();

        engine.toggle_stopwatch();
        engine.flush().await;
        assert!(engine.state().stopwatch.is_running);
        assert_eq!(count_warnings(&mut rx), 1);
    }

    #[tokio::test]
    async fn failed_load_holds_saves_back() {
        let (engine, loaded, mut rx) = engine_with_activity(FailingStore { loads: false }).await;
        assert!(loaded.is_err());
        assert!(!engine.is_loaded());
        assert_eq!(engine.backend_kind(), BackendKind::Remote);

        engine.toggle_stopwatch();
        engine.flush().await;
        assert!(engine.state().stopwatch.is_running);
        // Only the load is reported; no save was attempted.
        assert_eq!(count_warnings(&mut rx), 1);
    }

    #[tokio::test]
    async fn pushes_from_other_device_replace_state() {
        let h = harness().await;
        let phone = RemoteSyncStore::new(Arc::new(h.hub.clone()), "u1");
        let mut remote = ClockState::default();
        remote.focus.duration_minutes = 50;
        phone.save(&remote).await.unwrap();

        tokio::time::timeout(Duration::from_secs(1), async {
            while h.engine.state().focus.duration_minutes != 50 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn ticker_completes_and_publishes() {
        let h = harness().await;
        h.engine.start_timer(Some(5)).unwrap();
        let mut display = h.engine.watch_display();
        let ticker = h.engine.start_ticking();

        h.clock.advance_secs(6);
        tokio::time::sleep(Duration::from_millis(1_500)).await;

        assert!(h.engine.state().countdown.is_expired());
        display.changed().await.unwrap();
        assert!(display.borrow().timer_expired);

        ticker.stop().await;
    }
}
