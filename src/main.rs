mod app;
mod auth;
mod cli;
mod config;
mod constants;
mod domain;
mod error;
mod logging;
mod reminders;
mod services;
mod storage;
mod sync;
mod templates;

use std::sync::Arc;

use clap::Parser;

use crate::{
    cli::{Cli, Command},
    config::PulseConfig,
    error::PulseError,
    services::Services,
};

fn main() {
    let cli = Cli::parse();

    // The subscriber goes in first so startup warnings are not lost.
    let tui = matches!(cli.command, Some(Command::Ui) | None);
    let _log_guard = if tui {
        Some(logging::init_file(&storage::get_state_dir()))
    } else {
        logging::init_stderr();
        None
    };

    let config = match PulseConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => cli::report_error(&e),
    };
    let services = Services::build(config);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => cli::report_error(&PulseError::Io(e)),
    };

    match cli.command {
        Some(Command::Ui) | None => {
            if let Err(e) = app::run_ui(Arc::new(services), runtime.handle().clone()) {
                cli::report_error(&e);
            }
        }
        Some(command) => {
            if let Err(e) = runtime.block_on(cli::run_command(&services, command)) {
                cli::report_error(&e);
            }
        }
    }
}
