//! Countdown timer.
//!
//! Pausing rewrites `duration_seconds` to the time that was left, so a
//! resumed countdown continues from where it stopped rather than from the
//! original duration. Natural completion parks `end_time` on the expired
//! sentinel and is never recorded in history.

use serde::{Deserialize, Serialize};

use crate::clock::ms_to_utc;
use crate::error::ValidationError;
use crate::events::Event;

use super::{ceil_secs, DEFAULT_COUNTDOWN_SECONDS};

/// `end_time` value marking a countdown that ran out.
pub const EXPIRED_SENTINEL_MS: u64 = 0;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CountdownTimer {
    pub is_running: bool,
    pub end_time: Option<u64>,
    /// Base duration while idle; the remaining time after a pause.
    pub duration_seconds: u64,
}

impl Default for CountdownTimer {
    fn default() -> Self {
        Self::with_duration(DEFAULT_COUNTDOWN_SECONDS)
    }
}

impl CountdownTimer {
    pub fn with_duration(duration_seconds: u64) -> Self {
        Self {
            is_running: false,
            end_time: None,
            duration_seconds,
        }
    }

    pub fn is_due(&self, now: u64) -> bool {
        self.is_running && self.end_time.map_or(true, |end| now >= end)
    }

    /// Ran out on its own and has not been restarted or reset since.
    pub fn is_expired(&self) -> bool {
        !self.is_running && self.end_time == Some(EXPIRED_SENTINEL_MS)
    }

    pub fn remaining_ms(&self, now: u64) -> u64 {
        if self.is_running {
            self.end_time.map_or(0, |end| end.saturating_sub(now))
        } else {
            self.duration_seconds.saturating_mul(1000)
        }
    }

    pub fn remaining_seconds(&self, now: u64) -> u64 {
        ceil_secs(self.remaining_ms(now))
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Start (or resume) the countdown. A given duration replaces the
    /// stored one and restarts a running countdown; without one, a running
    /// countdown is left alone.
    pub fn start(
        &mut self,
        now: u64,
        duration_seconds: Option<u64>,
    ) -> Result<Option<Event>, ValidationError> {
        if duration_seconds.is_none() && self.is_running && !self.is_due(now) {
            return Ok(None);
        }
        let duration = duration_seconds.unwrap_or(self.duration_seconds);
        if duration == 0 {
            return Err(ValidationError::invalid(
                "duration_seconds",
                "nothing left to count down",
            ));
        }
        let end = now.saturating_add(duration.saturating_mul(1000));
        self.duration_seconds = duration;
        self.end_time = Some(end);
        self.is_running = true;
        Ok(Some(Event::TimerStarted {
            duration_secs: duration,
            ends_at_ms: end,
            at: ms_to_utc(now),
        }))
    }

    pub fn pause(&mut self, now: u64) -> Option<Event> {
        if !self.is_running {
            return None;
        }
        let remaining_secs = self.remaining_seconds(now);
        self.duration_seconds = remaining_secs;
        self.is_running = false;
        self.end_time = None;
        Some(Event::TimerPaused {
            remaining_secs,
            at: ms_to_utc(now),
        })
    }

    pub fn reset(&mut self, default_seconds: u64, now: u64) -> Event {
        self.is_running = false;
        self.end_time = None;
        self.duration_seconds = default_seconds;
        Event::TimerReset {
            duration_secs: default_seconds,
            at: ms_to_utc(now),
        }
    }

    pub fn complete(&mut self, now: u64) -> Option<Event> {
        if !self.is_due(now) {
            return None;
        }
        self.is_running = false;
        self.end_time = Some(EXPIRED_SENTINEL_MS);
        Some(Event::TimerCompleted { at: ms_to_utc(now) })
    }
}
