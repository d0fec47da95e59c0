use clap::Subcommand;

use crate::common::{finish, open_engine, CliResult, RemoteArgs};

#[derive(Subcommand)]
pub enum StopwatchAction {
    /// Start or stop
    Toggle,
    /// Record the current elapsed time as a lap
    Lap,
    /// Stop, zero and clear laps
    Reset,
}

pub async fn run(action: StopwatchAction, remote: &RemoteArgs) -> CliResult {
    let engine = open_engine(remote, None).await?;
    let events = match action {
        StopwatchAction::Toggle => engine.toggle_stopwatch(),
        StopwatchAction::Lap => engine.lap_stopwatch(),
        StopwatchAction::Reset => engine.reset_stopwatch(),
    };
    finish(&engine, events).await
}
