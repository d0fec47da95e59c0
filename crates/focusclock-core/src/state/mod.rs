//! Persisted timer state.
//!
//! [`ClockState`] is the whole durable document for one identity. It is
//! always written and replaced as a unit; nothing merges individual fields.

mod countdown;
mod focus;
mod stopwatch;

pub use countdown::{CountdownTimer, EXPIRED_SENTINEL_MS};
pub use focus::FocusSession;
pub use stopwatch::Stopwatch;

use serde::{Deserialize, Serialize};
use tracing::warn;

pub const DEFAULT_FOCUS_MINUTES: u32 = 25;
pub const DEFAULT_COUNTDOWN_SECONDS: u64 = 300;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClockState {
    #[serde(default)]
    pub focus: FocusSession,
    #[serde(default, alias = "timer")]
    pub countdown: CountdownTimer,
    #[serde(default)]
    pub stopwatch: Stopwatch,
}

impl ClockState {
    /// Fresh state using configured defaults.
    pub fn with_defaults(focus_minutes: u32, countdown_seconds: u64) -> Self {
        Self {
            focus: FocusSession::with_duration(focus_minutes),
            countdown: CountdownTimer::with_duration(countdown_seconds),
            stopwatch: Stopwatch::default(),
        }
    }

    /// Lenient decode of a stored document.
    ///
    /// Each sub-structure that is missing or fails to decode is replaced by
    /// its default instead of failing the whole load. Missing fields inside
    /// a sub-structure take their defaults too, and a zero focus duration
    /// is replaced by the default length.
    pub fn from_value(value: &serde_json::Value) -> Self {
        let Some(obj) = value.as_object() else {
            if !value.is_null() {
                warn!("stored clock state is not an object, using defaults");
            }
            return Self::default();
        };

        let mut focus: FocusSession = decode_part(obj.get("focus"), "focus");
        if focus.duration_minutes == 0 {
            warn!("stored focus duration is zero, using {DEFAULT_FOCUS_MINUTES} minutes");
            focus.duration_minutes = DEFAULT_FOCUS_MINUTES;
        }

        Self {
            focus,
            countdown: decode_part(obj.get("countdown").or_else(|| obj.get("timer")), "countdown"),
            stopwatch: decode_part(obj.get("stopwatch"), "stopwatch"),
        }
    }

    /// Lenient decode from JSON text; unparseable text yields defaults.
    pub fn from_json(json: &str) -> Self {
        match serde_json::from_str::<serde_json::Value>(json) {
            Ok(value) => Self::from_value(&value),
            Err(e) => {
                warn!("stored clock state is not valid JSON ({e}), using defaults");
                Self::default()
            }
        }
    }

    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

fn decode_part<T>(value: Option<&serde_json::Value>, name: &str) -> T
where
    T: Default + for<'de> Deserialize<'de>,
{
    match value {
        None | Some(serde_json::Value::Null) => T::default(),
        Some(v) => serde_json::from_value(v.clone()).unwrap_or_else(|e| {
            warn!("malformed {name} state ({e}), substituting defaults");
            T::default()
        }),
    }
}

/// Milliseconds to whole seconds, rounded up.
pub(crate) fn ceil_secs(ms: u64) -> u64 {
    ms.div_ceil(1000)
}
