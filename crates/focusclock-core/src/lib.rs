//! # Focusclock Core Library
//!
//! Drift-resistant focus session, countdown and stopwatch engine with
//! cloud or local persistence. The `focusclock-cli` binary is a thin layer
//! over this crate.
//!
//! ## Architecture
//!
//! - **State**: every timer stores absolute end instants or start instants,
//!   never a ticking counter; remaining time is derived on read
//! - **Reducer**: user actions are pure transitions over [`ClockState`]
//! - **Completion**: natural expiry is detected by polling and is the only
//!   path that logs to history
//! - **Backends**: one [`PersistenceBackend`] trait with a synced remote
//!   store and a local SQLite store, chosen from the auth signal
//! - **Engine**: [`ClockEngine`] owns the state, queues saves and runs the
//!   display and completion passes
//!
//! ## Key Components
//!
//! - [`ClockEngine`]: action entry points and projections
//! - [`Database`]: local state slot and focus history
//! - [`Config`]: application configuration management

pub mod activity;
pub mod backend;
pub mod clock;
pub mod completion;
pub mod engine;
pub mod error;
pub mod events;
pub mod history;
pub mod reducer;
pub mod state;
pub mod storage;
pub mod ticker;

pub use activity::{ActivityEvent, ActivityLog, Severity};
pub use backend::{
    AuthStatus, BackendKind, BackendSelector, HttpTransport, LocalStore, MemoryTransport,
    PersistenceBackend, RemoteSyncStore, RemoteTransport, Subscription,
};
pub use clock::{ManualClock, SystemClock, TimeSource};
pub use completion::{Completion, CompletionDetector};
pub use engine::{ClockEngine, EngineBuilder};
pub use error::{ConfigError, CoreError, StoreError, ValidationError};
pub use events::Event;
pub use history::{CompletedFocusEntry, HistoryLog, HistorySummary, MemoryHistory, SqliteHistory};
pub use reducer::{reduce, Action, ReduceContext, Transition};
pub use state::{ClockState, CountdownTimer, FocusSession, Stopwatch};
pub use storage::{Config, Database};
pub use ticker::{DisplaySnapshot, LapView, TickerHandle};
