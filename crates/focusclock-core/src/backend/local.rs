use std::sync::Arc;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::state::ClockState;
use crate::storage::Database;

use super::{BackendKind, PersistenceBackend, StateSink, Subscription};

/// Fixed kv slot holding the local clock state.
pub const LOCAL_STATE_KEY: &str = "clock_state";

/// Device-local fallback store.
///
/// Synchronous and durable; only read at startup or on a backend switch,
/// since nothing else writes to it.
pub struct LocalStore {
    db: Arc<Database>,
    defaults: ClockState,
}

impl LocalStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            db,
            defaults: ClockState::default(),
        }
    }

    pub fn with_defaults(mut self, defaults: ClockState) -> Self {
        self.defaults = defaults;
        self
    }
}

#[async_trait]
impl PersistenceBackend for LocalStore {
    fn kind(&self) -> BackendKind {
        BackendKind::Local
    }

    async fn load(&self) -> Result<ClockState, StoreError> {
        let db = self.db.clone();
        let stored = tokio::task::spawn_blocking(move || db.kv_get(LOCAL_STATE_KEY)).await??;
        Ok(match stored {
            Some(json) => ClockState::from_json(&json),
            None => self.defaults.clone(),
        })
    }

    async fn save(&self, state: &ClockState) -> Result<(), StoreError> {
        let json = serde_json::to_string(state)?;
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || db.kv_set(LOCAL_STATE_KEY, &json)).await??;
        Ok(())
    }

    fn subscribe(&self, _sink: StateSink) -> Subscription {
        Subscription::inert()
    }
}
