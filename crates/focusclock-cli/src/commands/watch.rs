use std::time::Duration;

use focusclock_core::{DisplaySnapshot, Severity};
use tokio::sync::mpsc;

use crate::common::{open_engine, CliResult, RemoteArgs};

fn clock_face(total_seconds: u64) -> String {
    format!("{:02}:{:02}", total_seconds / 60, total_seconds % 60)
}

fn stopwatch_face(ms: u64) -> String {
    let secs = ms / 1000;
    format!("{:02}:{:02}.{}", secs / 60, secs % 60, (ms % 1000) / 100)
}

/// One status line. Only redrawn when it changes.
fn render(snap: &DisplaySnapshot) -> String {
    let focus = if snap.focus_active { "running" } else { "idle" };
    let timer = if snap.timer_running {
        "running"
    } else if snap.timer_expired {
        "done"
    } else {
        "idle"
    };
    let stopwatch = if snap.stopwatch_running { "running" } else { "stopped" };
    format!(
        "focus {} ({focus}) | timer {} ({timer}) | stopwatch {} ({stopwatch})",
        clock_face(snap.focus_remaining_seconds),
        clock_face(snap.timer_remaining_seconds),
        stopwatch_face(snap.stopwatch_elapsed_ms),
    )
}

pub async fn run(seconds: Option<u64>, remote: &RemoteArgs) -> CliResult {
    let (activity_tx, mut activity) = mpsc::unbounded_channel();
    let engine = open_engine(remote, Some(activity_tx)).await?;
    let mut display = engine.watch_display();
    let ticker = engine.start_ticking();

    let deadline = async {
        match seconds {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(deadline);

    let mut last_line = String::new();
    loop {
        tokio::select! {
            _ = &mut deadline => break,
            _ = tokio::signal::ctrl_c() => break,
            Some(event) = activity.recv() => {
                match event.severity {
                    Severity::Info => println!("** {}", event.message),
                    _ => eprintln!("warning: {}", event.message),
                }
            }
            changed = display.changed() => {
                if changed.is_err() {
                    break;
                }
                let line = render(&display.borrow_and_update());
                if line != last_line {
                    println!("{line}");
                    last_line = line;
                }
            }
        }
    }

    ticker.stop().await;
    engine.flush().await;
    Ok(())
}
