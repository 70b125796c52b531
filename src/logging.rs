use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use crate::error::HarvestError;

/// Log file name for a run started now, e.g. `scraper_20250101_120000.log`.
pub fn log_file_name(prefix: &str) -> String {
    format!("{prefix}_{}.log", chrono::Local::now().format("%Y%m%d_%H%M%S"))
}

/// Installs the global subscriber: stderr plus one timestamped file per run.
///
/// The returned guard flushes the file writer on drop and must be kept alive
/// for the duration of the run.
pub fn init(logs_root: &Utf8Path, prefix: &str) -> Result<(WorkerGuard, Utf8PathBuf), HarvestError> {
    fs::create_dir_all(logs_root.as_std_path())
        .map_err(|err| HarvestError::Filesystem(format!("{logs_root}: {err}")))?;
    let file_name = log_file_name(prefix);
    let log_path = logs_root.join(&file_name);

    let file_appender = tracing_appender::rolling::never(logs_root.as_std_path(), &file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(
            fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(non_blocking),
        )
        .try_init()
        .map_err(|err| HarvestError::Filesystem(format!("logging already initialised: {err}")))?;

    info!(path = %log_path, "logging to file");
    Ok((guard, log_path))
}
