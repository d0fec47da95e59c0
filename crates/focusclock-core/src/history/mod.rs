//! Append-only log of completed focus sessions.
//!
//! Only the completion pass appends. Reads are full scans; every aggregate
//! is computed at read time against the *reader's* calendar day, so "today"
//! follows the device doing the reading rather than the one that logged
//! the entry.

mod sqlite;

pub use sqlite::SqliteHistory;

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StoreError;

/// One naturally completed focus session. Never mutated once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedFocusEntry {
    pub id: String,
    pub duration_minutes: u32,
    pub completed_at: DateTime<Utc>,
    pub label: String,
}

impl CompletedFocusEntry {
    pub fn new(duration_minutes: u32, completed_at: DateTime<Utc>, label: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            duration_minutes,
            completed_at,
            label: label.to_string(),
        }
    }
}

#[async_trait]
pub trait HistoryLog: Send + Sync {
    async fn append(&self, entry: CompletedFocusEntry) -> Result<(), StoreError>;

    /// Every entry, in append order.
    async fn entries(&self) -> Result<Vec<CompletedFocusEntry>, StoreError>;
}

/// In-process history, used for tests and remote simulations.
#[derive(Debug, Default)]
pub struct MemoryHistory {
    entries: Mutex<Vec<CompletedFocusEntry>>,
}

impl MemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl HistoryLog for MemoryHistory {
    async fn append(&self, entry: CompletedFocusEntry) -> Result<(), StoreError> {
        self.entries
            .lock()
            .map_err(|_| StoreError::Unavailable("history lock poisoned".into()))?
            .push(entry);
        Ok(())
    }

    async fn entries(&self) -> Result<Vec<CompletedFocusEntry>, StoreError> {
        Ok(self
            .entries
            .lock()
            .map_err(|_| StoreError::Unavailable("history lock poisoned".into()))?
            .clone())
    }
}

// ── Aggregates ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistorySummary {
    pub today_sessions: u64,
    pub today_minutes: u64,
    pub total_sessions: u64,
    pub total_minutes: u64,
}

fn local_day<Tz: TimeZone>(at: &DateTime<Utc>, tz: &Tz) -> NaiveDate {
    at.with_timezone(tz).date_naive()
}

fn is_on_day<Tz: TimeZone>(entry: &CompletedFocusEntry, day: NaiveDate, tz: &Tz) -> bool {
    local_day(&entry.completed_at, tz) == day
}

pub fn total_minutes_on<Tz: TimeZone>(
    entries: &[CompletedFocusEntry],
    day: NaiveDate,
    tz: &Tz,
) -> u64 {
    entries
        .iter()
        .filter(|e| is_on_day(e, day, tz))
        .map(|e| u64::from(e.duration_minutes))
        .sum()
}

pub fn sessions_on<Tz: TimeZone>(entries: &[CompletedFocusEntry], day: NaiveDate, tz: &Tz) -> u64 {
    entries.iter().filter(|e| is_on_day(e, day, tz)).count() as u64
}

/// Minutes focused on the reader's current calendar day in `tz`.
pub fn total_minutes_today_in<Tz: TimeZone>(
    entries: &[CompletedFocusEntry],
    now: DateTime<Utc>,
    tz: &Tz,
) -> u64 {
    total_minutes_on(entries, local_day(&now, tz), tz)
}

/// Minutes focused on this device's local calendar day.
pub fn total_minutes_today(entries: &[CompletedFocusEntry], now: DateTime<Utc>) -> u64 {
    total_minutes_today_in(entries, now, &Local)
}

pub fn summarize_in<Tz: TimeZone>(
    entries: &[CompletedFocusEntry],
    now: DateTime<Utc>,
    tz: &Tz,
) -> HistorySummary {
    let today = local_day(&now, tz);
    HistorySummary {
        today_sessions: sessions_on(entries, today, tz),
        today_minutes: total_minutes_on(entries, today, tz),
        total_sessions: entries.len() as u64,
        total_minutes: entries.iter().map(|e| u64::from(e.duration_minutes)).sum(),
    }
}

pub fn summarize(entries: &[CompletedFocusEntry], now: DateTime<Utc>) -> HistorySummary {
    summarize_in(entries, now, &Local)
}

/// Up to `limit` entries, most recently completed first.
pub fn recent(entries: &[CompletedFocusEntry], limit: usize) -> Vec<CompletedFocusEntry> {
    let mut sorted = entries.to_vec();
    sorted.sort_by(|a, b| b.completed_at.cmp(&a.completed_at));
    sorted.truncate(limit);
    sorted
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, FixedOffset};

    fn at(rfc3339: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(rfc3339).unwrap().with_timezone(&Utc)
    }

    fn entry(minutes: u32, completed_at: DateTime<Utc>) -> CompletedFocusEntry {
        CompletedFocusEntry::new(minutes, completed_at, "Focus")
    }

    #[test]
    fn today_is_relative_to_reader_timezone() {
        // 23:30 UTC on the 1st is already the 2nd in UTC+2.
        let entries = vec![entry(25, at("2026-03-01T23:30:00Z"))];
        let now = at("2026-03-02T08:00:00Z");

        assert_eq!(total_minutes_today_in(&entries, now, &Utc), 0);
        let plus_two = FixedOffset::east_opt(2 * 3600).unwrap();
        assert_eq!(total_minutes_today_in(&entries, now, &plus_two), 25);
    }

    #[test]
    fn summary_counts_today_and_all_time() {
        let now = at("2026-03-02T12:00:00Z");
        let entries = vec![
            entry(25, now - Duration::hours(1)),
            entry(50, now - Duration::hours(2)),
            entry(25, now - Duration::days(3)),
        ];
        let summary = summarize_in(&entries, now, &Utc);
        assert_eq!(
            summary,
            HistorySummary {
                today_sessions: 2,
                today_minutes: 75,
                total_sessions: 3,
                total_minutes: 100,
            }
        );
    }

    #[test]
    fn recent_is_newest_first_and_limited() {
        let now = at("2026-03-02T12:00:00Z");
        let entries = vec![
            entry(1, now - Duration::hours(3)),
            entry(2, now - Duration::hours(1)),
            entry(3, now - Duration::hours(2)),
        ];
        let listed = recent(&entries, 2);
        assert_eq!(
            listed.iter().map(|e| e.duration_minutes).collect::<Vec<_>>(),
            vec![2, 3]
        );
    }

    #[tokio::test]
    async fn memory_history_appends_in_order() {
        let log = MemoryHistory::new();
        let now = Utc::now();
        log.append(entry(25, now)).await.unwrap();
        log.append(entry(15, now)).await.unwrap();
        let all = log.entries().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].duration_minutes, 25);
        assert_eq!(all[1].duration_minutes, 15);
    }

    #[test]
    fn entries_get_unique_ids() {
        let now = Utc::now();
        assert_ne!(entry(25, now).id, entry(25, now).id);
    }
}
