use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use crate::constants::FILE_NAMES;

const DEFAULT_FILTER: &str = "pulse=info";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// CLI commands log to stderr so stdout stays clean for command output.
pub fn init_stderr() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// The TUI owns the terminal, so its logs go to a file in the state dir.
/// Keep the guard alive until exit or buffered lines are lost.
pub fn init_file(state_dir: &Path) -> WorkerGuard {
    let appender = tracing_appender::rolling::never(state_dir, FILE_NAMES.log);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(writer)
        .with_ansi(false)
        .try_init();
    guard
}
