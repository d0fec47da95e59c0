//! Focus (pomodoro) session.
//!
//! ```text
//! Idle --start--> Running --pause--> Idle        (nothing logged)
//!                 Running --complete--> Idle     (one history entry)
//! ```

use serde::{Deserialize, Serialize};

use crate::clock::ms_to_utc;
use crate::error::ValidationError;
use crate::events::Event;
use crate::history::CompletedFocusEntry;

use super::{ceil_secs, DEFAULT_FOCUS_MINUTES};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FocusSession {
    pub is_active: bool,
    /// Scheduled end (epoch ms). Ignored while inactive.
    pub end_time: Option<u64>,
    pub duration_minutes: u32,
}

impl Default for FocusSession {
    fn default() -> Self {
        Self::with_duration(DEFAULT_FOCUS_MINUTES)
    }
}

impl FocusSession {
    pub fn with_duration(duration_minutes: u32) -> Self {
        Self {
            is_active: false,
            end_time: None,
            duration_minutes,
        }
    }

    pub fn duration_ms(&self) -> u64 {
        u64::from(self.duration_minutes)
            .saturating_mul(60)
            .saturating_mul(1000)
    }

    /// Running and not yet past its end instant.
    pub fn is_running(&self, now: u64) -> bool {
        self.is_active && !self.is_due(now)
    }

    /// Natural completion guard: active and at or past the end instant.
    /// An active session without an end instant counts as due.
    pub fn is_due(&self, now: u64) -> bool {
        self.is_active && self.end_time.map_or(true, |end| now >= end)
    }

    pub fn remaining_ms(&self, now: u64) -> u64 {
        if self.is_active {
            self.end_time.map_or(0, |end| end.saturating_sub(now))
        } else {
            self.duration_ms()
        }
    }

    /// Whole seconds left, rounded up, never negative.
    pub fn remaining_seconds(&self, now: u64) -> u64 {
        ceil_secs(self.remaining_ms(now))
    }

    // ── Commands ─────────────────────────────────────────────────────

    pub fn start(&mut self, now: u64) -> Option<Event> {
        if self.is_running(now) {
            return None;
        }
        let end = now.saturating_add(self.duration_ms());
        self.is_active = true;
        self.end_time = Some(end);
        Some(Event::FocusStarted {
            duration_minutes: self.duration_minutes,
            ends_at_ms: end,
            at: ms_to_utc(now),
        })
    }

    /// Manual abort. Clears the active flag and logs nothing.
    pub fn pause(&mut self, now: u64) -> Option<Event> {
        if !self.is_active {
            return None;
        }
        let remaining_secs = self.remaining_seconds(now);
        self.is_active = false;
        Some(Event::FocusPaused {
            remaining_secs,
            at: ms_to_utc(now),
        })
    }

    pub fn reset(&mut self, now: u64) -> Event {
        self.is_active = false;
        self.end_time = None;
        Event::FocusReset { at: ms_to_utc(now) }
    }

    /// Only allowed while idle. A stale active flag (session already past
    /// its end) is cleared along the way.
    pub fn set_duration(&mut self, minutes: u32, now: u64) -> Result<Event, ValidationError> {
        if minutes == 0 {
            return Err(ValidationError::invalid(
                "duration_minutes",
                "must be greater than zero",
            ));
        }
        if self.is_running(now) {
            return Err(ValidationError::FocusRunning);
        }
        self.is_active = false;
        self.duration_minutes = minutes;
        Ok(Event::FocusDurationSet {
            duration_minutes: minutes,
            at: ms_to_utc(now),
        })
    }

    /// Natural completion. Builds the history entry first, then clears the
    /// active flag. Returns `None` when the session is not due.
    pub fn complete(&mut self, now: u64, label: &str) -> Option<(CompletedFocusEntry, Event)> {
        if !self.is_due(now) {
            return None;
        }
        let completed_at = ms_to_utc(self.end_time.unwrap_or(now).min(now));
        let entry = CompletedFocusEntry::new(self.duration_minutes, completed_at, label);
        self.is_active = false;
        let event = Event::FocusCompleted {
            entry_id: entry.id.clone(),
            duration_minutes: entry.duration_minutes,
            completed_at,
            at: ms_to_utc(now),
        };
        Some((entry, event))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T0: u64 = 1_700_000_000_000;

    #[test]
    fn start_sets_end_from_duration() {
        let mut focus = FocusSession::with_duration(25);
        assert!(focus.start(T0).is_some());
        assert!(focus.is_active);
        assert_eq!(focus.end_time, Some(T0 + 25 * 60 * 1000));
        assert_eq!(focus.remaining_seconds(T0), 25 * 60);
    }

    #[test]
    fn start_while_running_is_noop() {
        let mut focus = FocusSession::default();
        focus.start(T0);
        assert!(focus.start(T0 + 1_000).is_none());
        assert_eq!(focus.end_time, Some(T0 + 25 * 60 * 1000));
    }

    #[test]
    fn pause_clears_active_without_entry() {
        let mut focus = FocusSession::default();
        focus.start(T0);
        match focus.pause(T0 + 60_000) {
            Some(Event::FocusPaused { remaining_secs, .. }) => assert_eq!(remaining_secs, 24 * 60),
            other => panic!("unexpected {other:?}"),
        }
        assert!(!focus.is_active);
        assert!(focus.complete(T0 + 30 * 60_000, "Focus").is_none());
    }

    #[test]
    fn complete_logs_once_at_scheduled_end() {
        let mut focus = FocusSession::with_duration(25);
        focus.start(T0);
        let poll = T0 + 25 * 60_000 + 1_000;
        let (entry, _) = focus.complete(poll, "Focus").expect("due");
        assert_eq!(entry.duration_minutes, 25);
        assert_eq!(entry.completed_at.timestamp_millis() as u64, T0 + 25 * 60_000);
        assert!(!focus.is_active);
        assert!(focus.complete(poll + 1_000, "Focus").is_none());
    }

    #[test]
    fn not_due_before_end() {
        let mut focus = FocusSession::with_duration(1);
        focus.start(T0);
        assert!(focus.complete(T0 + 59_999, "Focus").is_none());
        assert!(focus.is_active);
    }

    #[test]
    fn set_duration_rejected_while_running() {
        let mut focus = FocusSession::default();
        focus.start(T0);
        assert!(matches!(
            focus.set_duration(50, T0 + 1),
            Err(ValidationError::FocusRunning)
        ));
        assert_eq!(focus.duration_minutes, 25);
    }

    #[test]
    fn set_duration_clears_stale_active_flag() {
        let mut focus = FocusSession {
            is_active: true,
            end_time: Some(T0),
            duration_minutes: 25,
        };
        focus.set_duration(45, T0 + 10).unwrap();
        assert!(!focus.is_active);
        assert_eq!(focus.duration_minutes, 45);
    }

    #[test]
    fn set_duration_rejects_zero() {
        let mut focus = FocusSession::default();
        assert!(focus.set_duration(0, T0).is_err());
    }

    #[test]
    fn remaining_clamps_to_zero_after_end() {
        let mut focus = FocusSession::with_duration(1);
        focus.start(T0);
        assert_eq!(focus.remaining_seconds(T0 + 5 * 60_000), 0);
    }

    #[test]
    fn idle_remaining_is_full_duration() {
        let focus = FocusSession::with_duration(10);
        assert_eq!(focus.remaining_seconds(T0), 600);
    }

    #[test]
    fn active_without_end_time_is_due() {
        let mut focus = FocusSession {
            is_active: true,
            end_time: None,
            duration_minutes: 5,
        };
        assert!(focus.is_due(T0));
        assert!(focus.complete(T0, "Focus").is_some());
    }
}
