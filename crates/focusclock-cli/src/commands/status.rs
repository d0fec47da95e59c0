use focusclock_core::{BackendKind, DisplaySnapshot, Event};
use serde::Serialize;

use crate::common::{open_engine, print_json, CliResult, RemoteArgs};

#[derive(Serialize)]
struct Status {
    backend: BackendKind,
    completed: Vec<Event>,
    display: DisplaySnapshot,
}

pub async fn run(remote: &RemoteArgs) -> CliResult {
    let engine = open_engine(remote, None).await?;
    let completed = engine
        .check_completion()
        .map(|c| c.events)
        .unwrap_or_default();
    print_json(&Status {
        backend: engine.backend_kind(),
        completed,
        display: engine.display(),
    })?;
    engine.flush().await;
    Ok(())
}
