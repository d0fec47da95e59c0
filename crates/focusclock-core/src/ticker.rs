//! Periodic passes and their lifetime handle.
//!
//! [`ClockEngine::start_ticking`](crate::ClockEngine::start_ticking) spawns
//! two tasks: a fast display pass that only derives a [`DisplaySnapshot`],
//! and a slower completion pass that may mutate and persist. Both stop when
//! the returned [`TickerHandle`] is stopped or dropped.

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::state::ClockState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LapView {
    pub number: usize,
    pub ms: u64,
}

/// Display values derived from the state at one instant. Never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplaySnapshot {
    pub at_ms: u64,
    pub focus_active: bool,
    pub focus_remaining_seconds: u64,
    pub focus_duration_minutes: u32,
    pub timer_running: bool,
    pub timer_expired: bool,
    pub timer_remaining_seconds: u64,
    pub stopwatch_running: bool,
    pub stopwatch_elapsed_ms: u64,
    pub laps: Vec<LapView>,
}

impl DisplaySnapshot {
    pub fn derive(state: &ClockState, now: u64) -> Self {
        Self {
            at_ms: now,
            focus_active: state.focus.is_active,
            focus_remaining_seconds: state.focus.remaining_seconds(now),
            focus_duration_minutes: state.focus.duration_minutes,
            timer_running: state.countdown.is_running,
            timer_expired: state.countdown.is_expired(),
            timer_remaining_seconds: state.countdown.remaining_seconds(now),
            stopwatch_running: state.stopwatch.is_running,
            stopwatch_elapsed_ms: state.stopwatch.elapsed_ms(now),
            laps: state
                .stopwatch
                .numbered_laps()
                .map(|(number, ms)| LapView { number, ms })
                .collect(),
        }
    }
}

/// Owned handle to the running passes.
#[derive(Debug)]
pub struct TickerHandle {
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl TickerHandle {
    pub(crate) fn new(cancel: CancellationToken, tasks: Vec<JoinHandle<()>>) -> Self {
        Self { cancel, tasks }
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Cancel both passes and wait for them to exit.
    pub async fn stop(mut self) {
        self.cancel.cancel();
        for task in std::mem::take(&mut self.tasks) {
            if let Err(e) = task.await {
                tracing::warn!("ticker task ended abnormally: {e}");
            }
        }
    }
}

impl Drop for TickerHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T0: u64 = 1_700_000_000_000;

    #[test]
    fn snapshot_of_idle_state_shows_durations() {
        let snap = DisplaySnapshot::derive(&ClockState::with_defaults(25, 300), T0);
        assert!(!snap.focus_active);
        assert_eq!(snap.focus_remaining_seconds, 25 * 60);
        assert_eq!(snap.timer_remaining_seconds, 300);
        assert_eq!(snap.stopwatch_elapsed_ms, 0);
        assert!(snap.laps.is_empty());
    }

    #[test]
    fn snapshot_counts_down_and_numbers_laps() {
        let mut state = ClockState::default();
        state.countdown.start(T0, Some(10)).unwrap();
        state.stopwatch.toggle(T0);
        state.stopwatch.lap(T0 + 1_000);
        state.stopwatch.lap(T0 + 2_500);

        let snap = DisplaySnapshot::derive(&state, T0 + 2_500);
        assert_eq!(snap.timer_remaining_seconds, 8);
        assert_eq!(
            snap.laps,
            vec![
                LapView { number: 2, ms: 2_500 },
                LapView { number: 1, ms: 1_000 },
            ]
        );
    }

    #[tokio::test]
    async fn dropping_handle_cancels() {
        let cancel = CancellationToken::new();
        let child = cancel.clone();
        let task = tokio::spawn(async move { child.cancelled().await });
        drop(TickerHandle::new(cancel.clone(), Vec::new()));
        assert!(cancel.is_cancelled());
        task.await.unwrap();
    }
}
