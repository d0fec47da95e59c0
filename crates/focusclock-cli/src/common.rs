//! Engine wiring shared by every command.

use std::sync::Arc;

use clap::Args;
use focusclock_core::{
    ActivityEvent, AuthStatus, BackendSelector, ClockEngine, ClockState, Config, Database, Event,
    HttpTransport, LocalStore, MemoryTransport, PersistenceBackend, RemoteTransport, SqliteHistory,
};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::debug;

pub type CliResult = Result<(), Box<dyn std::error::Error>>;

#[derive(Args, Debug, Default)]
pub struct RemoteArgs {
    /// Remote document store URL ("memory" for an in-process store).
    /// Defaults to `remote.base_url` from the config.
    #[arg(long, global = true)]
    pub remote: Option<String>,

    /// Identity whose synced state to use. Without it the local store is used.
    #[arg(long, global = true)]
    pub user: Option<String>,
}

impl RemoteArgs {
    fn auth_status(&self) -> AuthStatus {
        match &self.user {
            Some(uid) => AuthStatus::Connected { uid: uid.clone() },
            None => AuthStatus::Disconnected,
        }
    }

    fn transport(
        &self,
        config: &Config,
    ) -> Result<Option<Arc<dyn RemoteTransport>>, Box<dyn std::error::Error>> {
        let Some(url) = self.remote.as_ref().or(config.remote.base_url.as_ref()) else {
            return Ok(None);
        };
        let transport: Arc<dyn RemoteTransport> = if url == "memory" {
            Arc::new(MemoryTransport::new())
        } else {
            Arc::new(HttpTransport::new(
                url,
                config.remote.token.clone(),
                config.remote.poll_interval(),
            )?)
        };
        Ok(Some(transport))
    }
}

/// Open the configured backend and load state into a fresh engine.
pub async fn open_engine(
    remote: &RemoteArgs,
    activity: Option<mpsc::UnboundedSender<ActivityEvent>>,
) -> Result<ClockEngine, Box<dyn std::error::Error>> {
    let config = Config::load()?;
    let db = Arc::new(Database::open()?);
    let defaults = ClockState::with_defaults(
        config.focus.default_minutes,
        config.countdown.default_seconds,
    );

    let local = Arc::new(LocalStore::new(db.clone()).with_defaults(defaults.clone()));
    let mut selector = BackendSelector::new(local, defaults);
    if let Some(transport) = remote.transport(&config)? {
        selector = selector.with_transport(transport);
    }
    let backend = selector.select(&remote.auth_status());
    debug!("using {} store", backend.kind().as_str());

    let mut builder = ClockEngine::builder(backend, Arc::new(SqliteHistory::new(db))).config(config);
    if let Some(sink) = activity {
        builder = builder.activity(sink);
    }
    let (engine, loaded) = builder.start().await;
    loaded?;
    Ok(engine)
}

pub fn print_json<T: Serialize>(value: &T) -> CliResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[derive(Serialize)]
struct Outcome<'a> {
    events: &'a [Event],
    display: focusclock_core::DisplaySnapshot,
}

/// Print what an action did, wait for its save, and return.
pub async fn finish(engine: &ClockEngine, events: Vec<Event>) -> CliResult {
    print_json(&Outcome {
        events: &events,
        display: engine.display(),
    })?;
    engine.flush().await;
    Ok(())
}
