//! Pure state reducer.
//!
//! Every user action goes through [`reduce`]: current state and action in,
//! next state and the events it produced out. The engine then issues exactly
//! one persist call for a changed state.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::events::Event;
use crate::state::{ClockState, DEFAULT_COUNTDOWN_SECONDS};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", content = "value", rename_all = "snake_case")]
pub enum Action {
    StartFocus,
    PauseFocus,
    ResetFocus,
    SetFocusDuration(u32),
    /// Optional new duration in seconds.
    StartTimer(Option<u64>),
    PauseTimer,
    ResetTimer,
    ToggleStopwatch,
    LapStopwatch,
    ResetStopwatch,
}

/// Configuration the reducer needs but the state does not carry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReduceContext {
    pub countdown_default_seconds: u64,
}

impl Default for ReduceContext {
    fn default() -> Self {
        Self {
            countdown_default_seconds: DEFAULT_COUNTDOWN_SECONDS,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub state: ClockState,
    pub events: Vec<Event>,
}

impl Transition {
    /// False when the action was a no-op (e.g. starting a running session).
    pub fn changed(&self) -> bool {
        !self.events.is_empty()
    }
}

pub fn reduce(
    state: &ClockState,
    action: Action,
    now: u64,
    ctx: &ReduceContext,
) -> Result<Transition, ValidationError> {
    let mut next = state.clone();
    let event = match action {
        Action::StartFocus => next.focus.start(now),
        Action::PauseFocus => next.focus.pause(now),
        Action::ResetFocus => Some(next.focus.reset(now)),
        Action::SetFocusDuration(minutes) => Some(next.focus.set_duration(minutes, now)?),
        Action::StartTimer(seconds) => next.countdown.start(now, seconds)?,
        Action::PauseTimer => next.countdown.pause(now),
        Action::ResetTimer => Some(next.countdown.reset(ctx.countdown_default_seconds, now)),
        Action::ToggleStopwatch => Some(next.stopwatch.toggle(now)),
        Action::LapStopwatch => Some(next.stopwatch.lap(now)),
        Action::ResetStopwatch => Some(next.stopwatch.reset(now)),
    };

    Ok(Transition {
        state: next,
        events: event.into_iter().collect(),
    })
}
