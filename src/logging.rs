//! Logging setup
//!
//! The library only emits `tracing` events. Nothing is printed until the host
//! application installs a subscriber, either its own or the one set up by
//! [`init_logging`].

use tracing_subscriber::{fmt, EnvFilter, Registry};

/// Environment variable that overrides the log filter
pub const LOG_LEVEL_ENV: &str = "AMP_LOG_LEVEL";

/// Logging mode for different use cases
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoggingMode {
    /// No subscriber is installed
    Silent,
    /// Compact stderr output at `info`
    Development,
    /// Verbose output with targets and source locations, including every wire line
    Debug,
}

/// Logging configuration error
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Failed to initialize tracing subscriber: {0}")]
    TracingInit(String),

    #[error("Invalid log filter: {0}")]
    InvalidFilter(String),
}

/// Install the process-wide tracing subscriber
///
/// Call once, early. A second call fails with [`LoggingError::TracingInit`]
/// instead of replacing the first subscriber.
///
/// `AMP_LOG_LEVEL` (e.g. `debug` or `proaudio_amp::connection=trace`) overrides
/// the default filter of the chosen mode.
pub fn init_logging(mode: LoggingMode) -> Result<(), LoggingError> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    match mode {
        LoggingMode::Silent => Ok(()),
        LoggingMode::Development => {
            let filter = create_env_filter("info")?;

            Registry::default()
                .with(fmt::layer().with_target(false).compact())
                .with(filter)
                .try_init()
                .map_err(|e| LoggingError::TracingInit(e.to_string()))
        }
        LoggingMode::Debug => {
            let filter = create_env_filter("debug")?;

            Registry::default()
                .with(
                    fmt::layer()
                        .with_target(true)
                        .with_file(true)
                        .with_line_number(true),
                )
                .with(filter)
                .try_init()
                .map_err(|e| LoggingError::TracingInit(e.to_string()))
        }
    }
}

fn create_env_filter(default_level: &str) -> Result<EnvFilter, LoggingError> {
    match std::env::var(LOG_LEVEL_ENV) {
        Ok(directives) => EnvFilter::try_new(&directives)
            .map_err(|e| LoggingError::InvalidFilter(format!("{}: {}", directives, e))),
        Err(_) => EnvFilter::try_new(default_level)
            .map_err(|e| LoggingError::InvalidFilter(e.to_string())),
    }
}
