//! Local store and history on a real database file.

use std::sync::Arc;

use focusclock_core::{
    ClockEngine, Config, Database, LocalStore, ManualClock, PersistenceBackend, SqliteHistory,
};

const T0: u64 = 1_700_000_000_000;

async fn open_engine(path: &std::path::Path, clock: &ManualClock) -> ClockEngine {
    let db = Arc::new(Database::open_at(path).unwrap());
    let mut config = Config::default();
    config.focus.default_minutes = 1;
    config.focus.label = "Writing".into();
    let backend = Arc::new(LocalStore::new(db.clone()).with_defaults(
        focusclock_core::ClockState::with_defaults(1, config.countdown.default_seconds),
    ));
    let (engine, loaded) = ClockEngine::builder(backend, Arc::new(SqliteHistory::new(db)))
        .clock(Arc::new(clock.clone()))
        .config(config)
        .start()
        .await;
    loaded.unwrap();
    engine
}

#[tokio::test]
async fn test_running_state_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("focusclock.db");
    let clock = ManualClock::new(T0);

    {
        let engine = open_engine(&path, &clock).await;
        engine.start_timer(Some(120)).unwrap();
        engine.toggle_stopwatch();
        engine.flush().await;
    }

    clock.advance_secs(30);
    let engine = open_engine(&path, &clock).await;
    assert_eq!(engine.remaining_timer_seconds(), 90);
    assert_eq!(engine.stopwatch_elapsed_ms(), 30_000);
}

#[tokio::test]
async fn test_completion_found_after_restart_is_logged() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("focusclock.db");
    let clock = ManualClock::new(T0);

    {
        let engine = open_engine(&path, &clock).await;
        engine.start_focus();
        engine.flush().await;
    }

    // Closed mid-session, reopened well after the end.
    clock.advance_secs(3_600);
    let engine = open_engine(&path, &clock).await;
    assert!(engine.check_completion().unwrap().focus_completed());

    let entries = engine.history_entries().await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].duration_minutes, 1);
    assert_eq!(entries[0].label, "Writing");

    let summary = engine.history_summary().await.unwrap();
    assert_eq!(summary.total_sessions, 1);
    assert_eq!(summary.total_minutes, 1);
}

#[tokio::test]
async fn test_local_store_reads_back_saved_state() {
    let dir = tempfile::tempdir().unwrap();
    let db = Arc::new(Database::open_at(&dir.path().join("focusclock.db")).unwrap());
    let store = LocalStore::new(db);
    let mut state = store.load().await.unwrap();
    state.countdown.duration_seconds = 7;
    store.save(&state).await.unwrap();
    assert_eq!(store.load().await.unwrap().countdown.duration_seconds, 7);
}
