//! Natural-expiry detection.
//!
//! The completion pass is the only path allowed to clear a running flag on
//! expiry and the only one that appends to history. [`CompletionDetector::poll`]
//! is pure: it returns the completed state and leaves applying it, saving it
//! and logging the entry to the engine. Once applied, the guards are false
//! and later polls return `None`.

use crate::events::Event;
use crate::history::CompletedFocusEntry;
use crate::state::ClockState;

#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub state: ClockState,
    /// Present when a focus session completed in this pass.
    pub entry: Option<CompletedFocusEntry>,
    pub events: Vec<Event>,
}

impl Completion {
    pub fn focus_completed(&self) -> bool {
        self.entry.is_some()
    }

    pub fn timer_completed(&self) -> bool {
        self.events
            .iter()
            .any(|e| matches!(e, Event::TimerCompleted { .. }))
    }
}

#[derive(Debug, Clone)]
pub struct CompletionDetector {
    label: String,
}

impl CompletionDetector {
    /// `label` is stamped on every logged focus entry.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }

    pub fn poll(&self, state: &ClockState, now: u64) -> Option<Completion> {
        let focus_due = state.focus.is_due(now);
        let timer_due = state.countdown.is_due(now);
        if !focus_due && !timer_due {
            return None;
        }

        let mut next = state.clone();
        let mut events = Vec::new();
        let mut entry = None;

        if let Some((logged, event)) = next.focus.complete(now, &self.label) {
            entry = Some(logged);
            events.push(event);
        }
        if let Some(event) = next.countdown.complete(now) {
            events.push(event);
        }

        Some(Completion {
            state: next,
            entry,
            events,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ms_to_utc;

    const T0: u64 = 1_700_000_000_000;
    const MIN: u64 = 60_000;

    fn detector() -> CompletionDetector {
        CompletionDetector::new("Focus")
    }

    fn focusing(minutes: u32) -> ClockState {
        let mut state = ClockState::default();
        state.focus.duration_minutes = minutes;
        state.focus.start(T0);
        state
    }

    #[test]
    fn nothing_due_yields_none() {
        let state = focusing(25);
        assert!(detector().poll(&state, T0 + 24 * MIN).is_none());
        assert!(detector().poll(&ClockState::default(), T0).is_none());
    }

    #[test]
    fn focus_completion_logs_one_entry_at_scheduled_end() {
        let state = focusing(25);
        let done = detector().poll(&state, T0 + 25 * MIN + 1_000).unwrap();

        let entry = done.entry.as_ref().unwrap();
        assert_eq!(entry.duration_minutes, 25);
        assert_eq!(entry.completed_at, ms_to_utc(T0 + 25 * MIN));
        assert_eq!(entry.label, "Focus");
        assert!(!done.state.focus.is_active);
        assert!(!done.timer_completed());

        // Applied state is no longer due.
        assert!(detector().poll(&done.state, T0 + 26 * MIN).is_none());
    }

    #[test]
    fn countdown_completion_sets_sentinel_and_logs_nothing() {
        let mut state = ClockState::default();
        state.countdown.start(T0, Some(10)).unwrap();
        let done = detector().poll(&state, T0 + 10_000).unwrap();

        assert!(done.entry.is_none());
        assert!(done.timer_completed());
        assert!(!done.state.countdown.is_running);
        assert!(done.state.countdown.is_expired());
        assert!(detector().poll(&done.state, T0 + 20_000).is_none());
    }

    #[test]
    fn both_can_complete_in_one_pass() {
        let mut state = focusing(1);
        state.countdown.start(T0, Some(30)).unwrap();
        let done = detector().poll(&state, T0 + 2 * MIN).unwrap();
        assert!(done.focus_completed());
        assert!(done.timer_completed());
        assert_eq!(done.events.len(), 2);
    }

    #[test]
    fn paused_focus_never_completes() {
        let mut state = focusing(1);
        state.focus.pause(T0 + 1_000);
        assert!(detector().poll(&state, T0 + 10 * MIN).is_none());
    }
}
