use clap::Subcommand;

use crate::common::{finish, open_engine, CliResult, RemoteArgs};

#[derive(Subcommand)]
pub enum TimerAction {
    /// Start or resume the countdown
    Start {
        /// New duration in seconds; restarts a running countdown
        #[arg(long)]
        seconds: Option<u64>,
    },
    /// Pause, keeping the remaining time as the new duration
    Pause,
    /// Stop and restore the configured default duration
    Reset,
}

pub async fn run(action: TimerAction, remote: &RemoteArgs) -> CliResult {
    let engine = open_engine(remote, None).await?;
    let events = match action {
        TimerAction::Start { seconds } => engine.start_timer(seconds)?,
        TimerAction::Pause => engine.pause_timer(),
        TimerAction::Reset => engine.reset_timer(),
    };
    finish(&engine, events).await
}
