use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use thiserror::Error;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::fmt::time::{LocalTime, UtcTime};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::config_directory;

pub const LOG_ENV_VAR: &str = "HOSPREG_LOG";
const LOG_FILE_NAME: &str = "hospreg.log";
const DEFAULT_FILTER: &str = "info";

/// Where log events go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoggingDestination {
    /// JSON lines under `<config dir>/logs` plus plain text on stderr.
    FileAndStderr,
    /// JSON lines in the given directory plus plain text on stderr.
    DirectoryAndStderr(PathBuf),
    StderrOnly,
}

#[derive(Debug)]
struct LoggingState {
    _guard: Option<WorkerGuard>,
    log_path: Option<PathBuf>,
}

static LOGGING_STATE: OnceLock<LoggingState> = OnceLock::new();

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("failed to prepare log directory: {0}")]
    Io(#[from] io::Error),
    #[error("invalid logging filter: {0}")]
    Filter(#[from] ParseError),
    #[error("failed to install logging subscriber: {0}")]
    Subscriber(#[from] tracing_subscriber::util::TryInitError),
}

/// Install the global subscriber. The first call wins; later calls return
/// the log file chosen by the first.
pub fn init_logging(destination: LoggingDestination) -> Result<Option<&'static Path>, LoggingError> {
    if LOGGING_STATE.get().is_none() {
        let state = install(destination)?;
        let _ = LOGGING_STATE.set(state);
    }
    Ok(current_log_path())
}

pub fn current_log_path() -> Option<&'static Path> {
    LOGGING_STATE
        .get()
        .and_then(|state| state.log_path.as_deref())
}

fn install(destination: LoggingDestination) -> Result<LoggingState, LoggingError> {
    let log_dir = match destination {
        LoggingDestination::FileAndStderr => Some(config_directory().join("logs")),
        LoggingDestination::DirectoryAndStderr(dir) => Some(dir),
        LoggingDestination::StderrOnly => None,
    };

    let (file_layer, guard, log_path) = match log_dir {
        Some(dir) => {
            fs::create_dir_all(&dir)?;
            let appender = tracing_appender::rolling::never(&dir, LOG_FILE_NAME);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_timer(UtcTime::rfc_3339())
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer), Some(guard), Some(dir.join(LOG_FILE_NAME)))
        }
        None => (None, None, None),
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_timer(LocalTime::rfc_3339())
        .with_target(true)
        .with_writer(io::stderr)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(build_filter()?)
        .with(file_layer)
        .with(stderr_layer)
        .try_init()?;

    if let Some(path) = &log_path {
        info!(path = %path.display(), "Structured logging enabled");
    }

    Ok(LoggingState {
        _guard: guard,
        log_path,
    })
}

/// `HOSPREG_LOG` first, then `RUST_LOG`, then `info`.
fn build_filter() -> Result<EnvFilter, ParseError> {
    if let Ok(spec) = env::var(LOG_ENV_VAR)
        && !spec.trim().is_empty()
    {
        return EnvFilter::try_new(spec);
    }
    EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(DEFAULT_FILTER))
}
