pub mod cli;
pub mod commands;

use clap::Parser;
use cli::{Commands, Quill};
use commands::handle_command;
use quill_daemon::LOG_ENV;
use std::process;
use tracing_subscriber::EnvFilter;

/// Run the quill CLI application
pub fn run_main() {
    let args = Quill::parse();

    // The daemon worker and the API server log to files instead
    if !matches!(
        args.commands,
        Some(Commands::DaemonWorker) | Some(Commands::Serve { .. })
    ) {
        init_terminal_logging();
    }

    if let Err(e) = handle_command(args.commands) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn init_terminal_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
