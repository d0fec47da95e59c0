use serde::{Deserialize, Serialize};

use crate::clock::ms_to_utc;
use crate::events::Event;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Stopwatch {
    pub is_running: bool,
    pub start_time: Option<u64>,
    /// Time from earlier running windows.
    pub accumulated_ms: u64,
    /// Lap values, newest first.
    pub laps: Vec<u64>,
}

impl Stopwatch {
    fn running_segment_ms(&self, now: u64) -> u64 {
        match (self.is_running, self.start_time) {
            (true, Some(start)) => now.saturating_sub(start),
            _ => 0,
        }
    }

    pub fn elapsed_ms(&self, now: u64) -> u64 {
        self.accumulated_ms
            .saturating_add(self.running_segment_ms(now))
    }

    pub fn toggle(&mut self, now: u64) -> Event {
        if self.is_running {
            self.accumulated_ms = self.elapsed_ms(now);
            self.is_running = false;
            self.start_time = None;
            Event::StopwatchStopped {
                accumulated_ms: self.accumulated_ms,
                at: ms_to_utc(now),
            }
        } else {
            self.is_running = true;
            self.start_time = Some(now);
            Event::StopwatchStarted {
                accumulated_ms: self.accumulated_ms,
                at: ms_to_utc(now),
            }
        }
    }

    pub fn lap(&mut self, now: u64) -> Event {
        let lap_ms = self.elapsed_ms(now);
        self.laps.insert(0, lap_ms);
        Event::LapRecorded {
            lap_number: self.laps.len(),
            lap_ms,
            at: ms_to_utc(now),
        }
    }

    pub fn reset(&mut self, now: u64) -> Event {
        *self = Self::default();
        Event::StopwatchReset { at: ms_to_utc(now) }
    }

    /// `(lap number, value)` pairs in stored order; the newest lap has the
    /// highest number.
    pub fn numbered_laps(&self) -> impl Iterator<Item = (usize, u64)> + '_ {
        let count = self.laps.len();
        self.laps
            .iter()
            .enumerate()
            .map(move |(i, &lap)| (count - i, lap))
    }
}
