//! Dual-sink diagnostic logging.
//!
//! Every component emits through a [`Logger`] handle that carries the
//! component's name. Events are plain `tracing` events; [`init`] installs a
//! subscriber with up to two sinks driven by configuration:
//!
//! - console (`verbose`): message only, errors to stderr, the rest to stdout
//! - file (`logging_enabled`): `timestamp LEVEL: [component] message`, one
//!   line per event
//!
//! The console sink is registered first, so each event reaches the console
//! before the file. Both writes happen before the logging call returns.

use crate::config::Config;
use crate::env::{self, defaults, keys};
use chrono::Local;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::filter::{LevelFilter, Targets};
use tracing_subscriber::fmt::format::{self, FormatEvent, FormatFields};
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::fmt::FmtContext;
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry::LookupSpan;

/// Errors raised while installing the log sinks.
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    /// The log file or its directory could not be created
    #[error("Cannot open log file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A global subscriber was already installed
    #[error("Logging already initialized: {0}")]
    AlreadyInitialized(String),
}

/// Log sink settings resolved from configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct LogSettings {
    /// Write to the log file
    pub file_enabled: bool,
    /// Write to the console
    pub verbose: bool,
    /// Log file location
    pub file: PathBuf,
    /// Maximum level emitted by both sinks
    pub level: LevelFilter,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            file_enabled: false,
            verbose: false,
            file: PathBuf::from(defaults::LOG_FILE),
            level: LevelFilter::INFO,
        }
    }
}

impl LogSettings {
    pub fn from_config(config: &Config) -> Self {
        let level = match config.get_custom_value(keys::LOG_LEVEL, true) {
            Some(value) => match value.as_i64() {
                Some(number) => numeric_level(number),
                None => value.as_str().and_then(|name| name.parse().ok()),
            },
            None => defaults::LOG_LEVEL.parse().ok(),
        }
        .unwrap_or(LevelFilter::INFO);

        Self {
            file_enabled: config.flag(keys::LOGGING_ENABLED).unwrap_or(false),
            verbose: config.flag(keys::VERBOSE).unwrap_or(false),
            file: PathBuf::from(config.text(keys::LOG_FILE).unwrap_or(defaults::LOG_FILE)),
            level,
        }
    }
}

/// Map numeric levels (`10` debug, `20` info, `30` warning, `40`/`50` error)
/// to a filter. Values between steps round down to the more verbose level.
fn numeric_level(level: i64) -> Option<LevelFilter> {
    match level {
        i64::MIN..0 => None,
        0..10 => Some(LevelFilter::TRACE),
        10..20 => Some(LevelFilter::DEBUG),
        20..30 => Some(LevelFilter::INFO),
        30..40 => Some(LevelFilter::WARN),
        _ => Some(LevelFilter::ERROR),
    }
}

/// Install the global subscriber for `settings`.
///
/// # Errors
///
/// Returns an error if the log file cannot be opened or a subscriber is
/// already installed.
pub fn init(settings: &LogSettings) -> Result<(), LoggingError> {
    let subscriber = build_subscriber(settings)?;
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))
}

/// Build the subscriber without installing it.
pub fn build_subscriber(
    settings: &LogSettings,
) -> Result<impl Subscriber + Send + Sync + 'static, LoggingError> {
    let filter = Targets::new().with_target(env::APP_NAME, settings.level);

    let console = settings.verbose.then(|| {
        tracing_subscriber::fmt::layer()
            .event_format(LineFormat { timestamps: false })
            .with_writer(
                std::io::stderr
                    .with_max_level(Level::ERROR)
                    .or_else(std::io::stdout),
            )
            .with_filter(filter.clone())
    });

    let file = if settings.file_enabled {
        let handle = open_log_file(&settings.file)?;
        Some(
            tracing_subscriber::fmt::layer()
                .event_format(LineFormat { timestamps: true })
                .with_ansi(false)
                .with_writer(Mutex::new(handle))
                .with_filter(filter),
        )
    } else {
        None
    };

    Ok(tracing_subscriber::registry().with(console).with(file))
}

fn open_log_file(path: &Path) -> Result<File, LoggingError> {
    let io_error = |source| LoggingError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_error)?;
    }

    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(io_error)
}

/// One line per event. With timestamps the line also carries the level and
/// the emitting component.
struct LineFormat {
    timestamps: bool,
}

impl<S, N> FormatEvent<S, N> for LineFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: format::Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let mut fields = EventFields::default();
        event.record(&mut fields);

        if self.timestamps {
            write!(
                writer,
                "{} {}: ",
                Local::now().format("%Y-%m-%d %H:%M:%S,%3f"),
                event.metadata().level()
            )?;
            if let Some(component) = &fields.component {
                write!(writer, "[{}] ", component)?;
            }
        }
        writeln!(writer, "{}", fields.message)
    }
}

#[derive(Default)]
struct EventFields {
    message: String,
    component: Option<String>,
}

impl Visit for EventFields {
    fn record_str(&mut self, field: &Field, value: &str) {
        match field.name() {
            "message" => self.message.push_str(value),
            "component" => self.component = Some(value.to_string()),
            _ => {}
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        match field.name() {
            "message" => self.message = format!("{:?}", value),
            "component" => self.component = Some(format!("{:?}", value)),
            _ => {}
        }
    }
}

/// Logging handle owned by a pipeline component.
#[derive(Debug, Clone)]
pub struct Logger {
    component: String,
}

impl Logger {
    /// Create a handle for `component`.
    pub fn new(component: impl Into<String>) -> Self {
        let logger = Self {
            component: component.into(),
        };
        logger.debug(format_args!("Logger initialized by {}", logger.component));
        logger
    }

    pub fn component(&self) -> &str {
        &self.component
    }

    pub fn debug(&self, message: impl fmt::Display) {
        tracing::debug!(target: "dockhand", component = %self.component, "{}", message);
    }

    pub fn info(&self, message: impl fmt::Display) {
        tracing::info!(target: "dockhand", component = %self.component, "{}", message);
    }

    pub fn warn(&self, message: impl fmt::Display) {
        tracing::warn!(target: "dockhand", component = %self.component, "{}", message);
    }

    pub fn error(&self, message: impl fmt::Display) {
        tracing::error!(target: "dockhand", component = %self.component, "{}", message);
    }
}
