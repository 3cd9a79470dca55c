//! Structured logging bootstrap.
//!
//! Logging is set up once per process with [`init`]. The returned
//! [`LoggingGuard`] must be held for the lifetime of the process: dropping it
//! flushes buffered log lines to the log file.

use std::{
    fs::{File, OpenOptions},
    path::{Path, PathBuf},
};

use thiserror::Error;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter, Registry, filter::LevelFilter, layer::SubscriberExt, reload,
    util::SubscriberInitExt,
};

const WINDOWS: &str = "windows";

/// Logging error.
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("Logging already initialized: {0}")]
    AlreadyInitialized(#[from] tracing_subscriber::util::TryInitError),
    #[error("Failed to change log level: {0}")]
    Reload(#[from] reload::Error),
}

/// Parameters used to set up logging.
#[derive(Debug, Clone)]
pub struct LogParameters {
    /// Operating system the agent runs on (`linux`, `windows`, ...).
    pub os_type: String,
    /// Minimum level written to the log.
    pub level: Level,
    /// Log file. `None` logs to stdout.
    pub log_file_name: Option<PathBuf>,
}

impl Default for LogParameters {
    fn default() -> Self {
        Self {
            os_type: std::env::consts::OS.to_string(),
            level: Level::INFO,
            log_file_name: None,
        }
    }
}

/// Handle on the installed subscriber.
///
/// Keeps the background writer alive and allows the level to be changed
/// after configuration has been read.
pub struct LoggingGuard {
    _writer: WorkerGuard,
    filter: reload::Handle<EnvFilter, Registry>,
    /// `RUST_LOG` was set and takes precedence over configured levels.
    env_override: bool,
    log_file: Option<PathBuf>,
}

impl LoggingGuard {
    /// Change the active log level. Ignored when `RUST_LOG` is set.
    ///
    /// # Errors
    /// Returns error if the subscriber has been dropped.
    pub fn set_level(&self, level: Level) -> Result<(), LoggingError> {
        if self.env_override {
            tracing::debug!(%level, "RUST_LOG is set, keeping its filter");
            return Ok(());
        }
        self.filter.reload(level_filter(level))?;
        tracing::debug!(%level, "Log level updated");
        Ok(())
    }

    /// File logs are written to, if any.
    #[must_use]
    pub fn log_file(&self) -> Option<&Path> {
        self.log_file.as_deref()
    }
}

/// Install the process-wide subscriber.
///
/// Lines are written as JSON to the configured log file. When the file cannot
/// be opened, human readable lines go to stdout instead.
///
/// # Errors
/// Returns error if a global subscriber is already installed.
pub fn init(params: &LogParameters) -> Result<LoggingGuard, LoggingError> {
    let env_filter = EnvFilter::try_from_default_env().ok();
    let env_override = env_filter.is_some();
    let (filter, handle) =
        reload::Layer::new(env_filter.unwrap_or_else(|| level_filter(params.level)));

    let file = params
        .log_file_name
        .as_deref()
        .and_then(|path| match open_log_file(path) {
            Ok(file) => Some((path.to_path_buf(), file)),
            Err(e) => {
                eprintln!("Could not open log file {}: {e}, logging to stdout", path.display());
                None
            }
        });

    let (worker, log_file) = match file {
        Some((path, file)) => {
            let (writer, guard) = tracing_appender::non_blocking(file);
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_current_span(true)
                        .with_file(true)
                        .with_line_number(true)
                        .with_writer(writer),
                )
                .try_init()?;
            (guard, Some(path))
        }
        None => {
            let (writer, guard) = tracing_appender::non_blocking(std::io::stdout());
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_target(true)
                        .with_writer(writer),
                )
                .try_init()?;
            (guard, None)
        }
    };

    Ok(LoggingGuard {
        _writer: worker,
        filter: handle,
        env_override,
        log_file,
    })
}

fn open_log_file(path: &Path) -> std::io::Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

fn level_filter(level: Level) -> EnvFilter {
    EnvFilter::default().add_directive(LevelFilter::from_level(level).into())
}

/// Parse a command line log level. `None` if the level is not supported.
#[must_use]
pub fn level_from_str(level: &str) -> Option<Level> {
    match level {
        "debug" => Some(Level::DEBUG),
        "info" => Some(Level::INFO),
        "warn" => Some(Level::WARN),
        "error" => Some(Level::ERROR),
        _ => None,
    }
}

/// Base directory for Windows logs.
#[must_use]
pub fn windows_log_base_path() -> String {
    match std::env::var("PROGRAMDATA") {
        Ok(path) if !path.is_empty() => path,
        _ => r"C:\Program Files".to_string(),
    }
}

/// Log file for a one time execution (`ote`) of an agent command.
///
/// An empty `ote` names the daemon log. A non-empty `log_dir` replaces the
/// platform default directory.
#[must_use]
pub fn ote_file_path(agent_name: &str, ote: &str, os_type: &str, log_dir: &str) -> PathBuf {
    let log_name = if ote.is_empty() {
        agent_name.to_string()
    } else {
        format!("{agent_name}-{ote}")
    };

    if os_type == WINDOWS {
        if log_dir.is_empty() {
            return PathBuf::from(format!(
                r"{}\Google\{agent_name}\logs\{log_name}.log",
                windows_log_base_path()
            ));
        }
        return PathBuf::from(format!("{}{log_name}.log", with_trailing(log_dir, '\\')));
    }

    if log_dir.is_empty() {
        PathBuf::from(format!("/var/log/{log_name}.log"))
    } else {
        PathBuf::from(format!("{}{log_name}.log", with_trailing(log_dir, '/')))
    }
}

/// Default one time execution log path, with a `{COMMAND}` placeholder.
#[must_use]
pub fn default_ote_path(agent_name: &str, os_type: &str, log_dir: &str) -> PathBuf {
    ote_file_path(agent_name, "{COMMAND}", os_type, log_dir)
}

fn with_trailing(dir: &str, sep: char) -> String {
    if dir.ends_with(sep) {
        dir.to_string()
    } else {
        format!("{dir}{sep}")
    }
}
