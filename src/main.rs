//! einvoice: command-line client for the e-invoicing API.
//!
//! Entry point for the einvoice application.

use einvoice_sdk::config::{
    Cli, Command, ValidatedConfig, default_output_path, write_default_config,
};
use std::path::PathBuf;
use std::process::ExitCode;

mod app;
mod run;

use app::{exit_code, print_config_hint, setup_tracing};
use run::Task;

/// Main entry point.
///
/// Excluded from coverage as it's the thin wrapper around testable components.
#[cfg(not(tarpaulin_include))]
fn main() -> ExitCode {
    let cli = Cli::parse_args();

    // Handle init subcommand
    if let Command::Init { output, force } = &cli.command {
        return handle_init(output.clone().unwrap_or_else(default_output_path), *force);
    }

    // Load and validate configuration
    let config = match ValidatedConfig::load(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            print_config_hint(&e);
            return exit_code::CONFIG_ERROR;
        }
    };

    setup_tracing(config.verbose);
    if let Some(path) = &config.config_file {
        tracing::debug!("Loaded config file {}", path.display());
    }
    tracing::debug!("{config}");

    let task = match Task::resolve(cli.command, &config) {
        Ok(Some(task)) => task,
        Ok(None) => return exit_code::SUCCESS,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            print_config_hint(&e);
            return exit_code::CONFIG_ERROR;
        }
    };

    run_application(task)
}

/// Handles the `init` subcommand.
fn handle_init(output: PathBuf, force: bool) -> ExitCode {
    match write_default_config(&output, force) {
        Ok(()) => {
            println!("Configuration template written to: {}", output.display());
            exit_code::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {e}");
            print_config_hint(&e);
            exit_code::CONFIG_ERROR
        }
    }
}

/// Runs the resolved task to completion.
///
/// Excluded from coverage - requires async runtime.
#[cfg(not(tarpaulin_include))]
fn run_application(task: Task) -> ExitCode {
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!("Failed to create Tokio runtime: {e}");
            return exit_code::runtime_error();
        }
    };

    let mut stdout = std::io::stdout().lock();
    match runtime.block_on(run::execute(task, &mut stdout)) {
        Ok(()) => exit_code::SUCCESS,
        Err(e) => {
            tracing::error!("{e}");
            exit_code::runtime_error()
        }
    }
}
