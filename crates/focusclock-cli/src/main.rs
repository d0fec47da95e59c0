use clap::{Parser, Subcommand};

mod commands;
mod common;

#[derive(Parser)]
#[command(name = "focusclock-cli", version, about = "Focusclock CLI")]
struct Cli {
    #[command(flatten)]
    remote: common::RemoteArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Focus session control
    Focus {
        #[command(subcommand)]
        action: commands::focus::FocusAction,
    },
    /// Countdown timer control
    Timer {
        #[command(subcommand)]
        action: commands::timer::TimerAction,
    },
    /// Stopwatch control
    Stopwatch {
        #[command(subcommand)]
        action: commands::stopwatch::StopwatchAction,
    },
    /// Run a completion check and print the current display values
    Status,
    /// Completed focus sessions
    History {
        #[command(subcommand)]
        action: commands::history::HistoryAction,
    },
    /// Keep ticking and print the display as it changes
    Watch {
        /// Stop after this many seconds (default: until Ctrl-C)
        #[arg(long)]
        seconds: Option<u64>,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_env("FOCUSCLOCK_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();
    let remote = cli.remote;
    let result = match cli.command {
        Commands::Focus { action } => commands::focus::run(action, &remote).await,
        Commands::Timer { action } => commands::timer::run(action, &remote).await,
        Commands::Stopwatch { action } => commands::stopwatch::run(action, &remote).await,
        Commands::Status => commands::status::run(&remote).await,
        Commands::History { action } => commands::history::run(action, &remote).await,
        Commands::Watch { seconds } => commands::watch::run(seconds, &remote).await,
        Commands::Config { action } => commands::config::run(action),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
