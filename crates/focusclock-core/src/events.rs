use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::backend::BackendKind;

/// Every state change in the system produces an Event.
/// The engine forwards them to the activity log; the CLI prints them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    FocusStarted {
        duration_minutes: u32,
        ends_at_ms: u64,
        at: DateTime<Utc>,
    },
    /// Manual abort. Never recorded in history.
    FocusPaused {
        remaining_secs: u64,
        at: DateTime<Utc>,
    },
    FocusReset {
        at: DateTime<Utc>,
    },
    FocusDurationSet {
        duration_minutes: u32,
        at: DateTime<Utc>,
    },
    FocusCompleted {
        entry_id: String,
        duration_minutes: u32,
        completed_at: DateTime<Utc>,
        at: DateTime<Utc>,
    },
    TimerStarted {
        duration_secs: u64,
        ends_at_ms: u64,
        at: DateTime<Utc>,
    },
    TimerPaused {
        remaining_secs: u64,
        at: DateTime<Utc>,
    },
    TimerReset {
        duration_secs: u64,
        at: DateTime<Utc>,
    },
    TimerCompleted {
        at: DateTime<Utc>,
    },
    StopwatchStarted {
        accumulated_ms: u64,
        at: DateTime<Utc>,
    },
    StopwatchStopped {
        accumulated_ms: u64,
        at: DateTime<Utc>,
    },
    LapRecorded {
        lap_number: usize,
        lap_ms: u64,
        at: DateTime<Utc>,
    },
    StopwatchReset {
        at: DateTime<Utc>,
    },
    /// In-memory state was replaced wholesale from a backend
    /// (initial load, backend switch, or pushed update).
    StateReplaced {
        backend: BackendKind,
        at: DateTime<Utc>,
    },
}

impl Event {
    /// Which timer the event concerns.
    pub fn source(&self) -> &'static str {
        match self {
            Event::FocusStarted { .. }
            | Event::FocusPaused { .. }
            | Event::FocusReset { .. }
            | Event::FocusDurationSet { .. }
            | Event::FocusCompleted { .. } => "focus",
            Event::TimerStarted { .. }
            | Event::TimerPaused { .. }
            | Event::TimerReset { .. }
            | Event::TimerCompleted { .. } => "timer",
            Event::StopwatchStarted { .. }
            | Event::StopwatchStopped { .. }
            | Event::LapRecorded { .. }
            | Event::StopwatchReset { .. } => "stopwatch",
            Event::StateReplaced { .. } => "sync",
        }
    }

    /// One-line human readable description.
    pub fn message(&self) -> String {
        match self {
            Event::FocusStarted {
                duration_minutes, ..
            } => format!("Focus session started ({duration_minutes}m)"),
            Event::FocusPaused { remaining_secs, .. } => {
                format!("Focus session stopped with {remaining_secs}s left")
            }
            Event::FocusReset { .. } => "Focus session reset".to_string(),
            Event::FocusDurationSet {
                duration_minutes, ..
            } => format!("Focus duration set to {duration_minutes}m"),
            Event::FocusCompleted {
                duration_minutes, ..
            } => format!("Focus session completed ({duration_minutes}m)"),
            Event::TimerStarted { duration_secs, .. } => {
                format!("Timer started ({duration_secs}s)")
            }
            Event::TimerPaused { remaining_secs, .. } => {
                format!("Timer paused with {remaining_secs}s left")
            }
            Event::TimerReset { duration_secs, .. } => {
                format!("Timer reset to {duration_secs}s")
            }
            Event::TimerCompleted { .. } => "Timer finished".to_string(),
            Event::StopwatchStarted { .. } => "Stopwatch started".to_string(),
            Event::StopwatchStopped { accumulated_ms, .. } => {
                format!("Stopwatch stopped at {accumulated_ms}ms")
            }
            Event::LapRecorded {
                lap_number, lap_ms, ..
            } => format!("Lap {lap_number} recorded at {lap_ms}ms"),
            Event::StopwatchReset { .. } => "Stopwatch reset".to_string(),
            Event::StateReplaced { backend, .. } => {
                format!("State loaded from {} store", backend.as_str())
            }
        }
    }

    pub fn at(&self) -> DateTime<Utc> {
        match self {
            Event::FocusStarted { at, .. }
            | Event::FocusPaused { at, .. }
            | Event::FocusReset { at }
            | Event::FocusDurationSet { at, .. }
            | Event::FocusCompleted { at, .. }
            | Event::TimerStarted { at, .. }
            | Event::TimerPaused { at, .. }
            | Event::TimerReset { at, .. }
            | Event::TimerCompleted { at }
            | Event::StopwatchStarted { at, .. }
            | Event::StopwatchStopped { at, .. }
            | Event::LapRecorded { at, .. }
            | Event::StopwatchReset { at }
            | Event::StateReplaced { at, .. } => *at,
        }
    }
}
