use chrono::{Local, Utc};
use clap::Subcommand;
use focusclock_core::history;
use serde_json::json;

use crate::common::{open_engine, print_json, CliResult, RemoteArgs};

#[derive(Subcommand)]
pub enum HistoryAction {
    /// Minutes and sessions completed today
    Today,
    /// Most recent completed sessions
    List {
        #[arg(long, default_value = "10")]
        limit: usize,
    },
    /// Today and all-time totals
    Summary,
}

pub async fn run(action: HistoryAction, remote: &RemoteArgs) -> CliResult {
    let engine = open_engine(remote, None).await?;
    // Sessions that ended while nothing was running still count.
    engine.check_completion();

    match action {
        HistoryAction::Today => {
            let entries = engine.history_entries().await?;
            let now = Utc::now();
            let today = now.with_timezone(&Local).date_naive();
            print_json(&json!({
                "date": today.to_string(),
                "sessions": history::sessions_on(&entries, today, &Local),
                "minutes": history::total_minutes_today(&entries, now),
            }))?;
        }
        HistoryAction::List { limit } => {
            let entries = engine.history_entries().await?;
            print_json(&history::recent(&entries, limit))?;
        }
        HistoryAction::Summary => {
            print_json(&engine.history_summary().await?)?;
        }
    }
    engine.flush().await;
    Ok(())
}
