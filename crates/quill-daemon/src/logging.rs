use quill_core::{ConfigPaths, QuillError, Result};
use std::fs;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter, e.g. `QUILL_LOG=debug`
pub const LOG_ENV: &str = "QUILL_LOG";

/// Send tracing output to a daily rolling file `<config>/logs/<name>.log.YYYY-MM-DD`.
///
/// The returned guard flushes buffered lines when dropped; hold it for the
/// life of the process.
pub fn init_file_logging(paths: &ConfigPaths, name: &str) -> Result<WorkerGuard> {
    let log_dir = paths.log_dir();
    fs::create_dir_all(&log_dir)?;

    let appender = tracing_appender::rolling::daily(&log_dir, format!("{}.log", name));
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .with_target(false)
        .try_init()
        .map_err(|e| QuillError::Other(format!("Failed to initialise logging: {}", e)))?;

    Ok(guard)
}
