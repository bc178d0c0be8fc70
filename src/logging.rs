//! Tracing subscriber set-up.
//!
//! Console output carries level and message only; the log file adds
//! timestamps. Both honour `RUST_LOG`, defaulting to `rig=info`.

use std::path::Path;

use tracing_appender::rolling::RollingFileAppender;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Logging set-up errors.
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Can't use log file {0}: no file name")]
    BadPath(String),

    #[error("Invalid log filter: {0}")]
    Filter(#[from] tracing_subscriber::filter::ParseError),

    #[error("Logging already initialized: {0}")]
    Init(#[from] tracing_subscriber::util::TryInitError),
}

/// Appender that writes to exactly `path`, never rotating.
pub fn file_appender(path: &Path) -> Result<RollingFileAppender, LoggingError> {
    let file_name = path
        .file_name()
        .ok_or_else(|| LoggingError::BadPath(path.display().to_string()))?;
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    Ok(tracing_appender::rolling::never(parent, file_name))
}

/// Install the global subscriber.
pub fn init(log_file: &Path) -> Result<(), LoggingError> {
    let filter = EnvFilter::from_default_env().add_directive("rig=info".parse()?);

    let console = fmt::layer().without_time().with_target(false);
    let file = fmt::layer()
        .with_ansi(false)
        .with_target(false)
        .with_writer(file_appender(log_file)?);

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .try_init()?;
    Ok(())
}
