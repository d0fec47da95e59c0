use clap::Subcommand;

use crate::common::{finish, open_engine, CliResult, RemoteArgs};

#[derive(Subcommand)]
pub enum FocusAction {
    /// Start a focus session with the current duration
    Start,
    /// Abort the running session (not recorded in history)
    Pause,
    /// Return to idle, keeping the duration
    Reset,
    /// Set the session length while idle
    Duration {
        /// Length in minutes
        minutes: u32,
    },
}

pub async fn run(action: FocusAction, remote: &RemoteArgs) -> CliResult {
    let engine = open_engine(remote, None).await?;
    let events = match action {
        FocusAction::Start => engine.start_focus(),
        FocusAction::Pause => engine.pause_focus(),
        FocusAction::Reset => engine.reset_focus(),
        FocusAction::Duration { minutes } => engine.set_focus_duration(minutes)?,
    };
    finish(&engine, events).await
}
