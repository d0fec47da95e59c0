pub mod config;
pub mod focus;
pub mod history;
pub mod status;
pub mod stopwatch;
pub mod timer;
pub mod watch;
