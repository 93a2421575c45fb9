//! Logging infrastructure for the shim
//!
//! The shim runs inside someone else's app process, so it never installs a
//! subscriber on its own. Glue code that wants shim logs calls one of the
//! init functions early, before `subscribe()`.

use tracing_subscriber::{fmt, EnvFilter, Registry};

/// Characters of a token kept by [`redact`]
const REDACTED_PREFIX: usize = 8;

/// Logging mode for different use cases
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoggingMode {
    /// No output; the host app's own logging is left alone
    Silent,
    /// Compact stderr output for development
    Development,
    /// Verbose diagnostics with thread ids and source locations
    Debug,
}

/// Logging configuration error
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Failed to initialize tracing subscriber: {0}")]
    TracingInit(String),
}

/// Initialize logging with the specified mode
///
/// # Environment Variables
///
/// - `FCM2UP_LOG_LEVEL`: Override log level or directives (e.g. "fcm2up_shim=debug")
/// - `RUST_LOG`: Used when `FCM2UP_LOG_LEVEL` is unset
///
/// Leaves an already installed global subscriber in place, whether it came
/// from an earlier call or from the host app.
pub fn init_logging(mode: LoggingMode) -> Result<(), LoggingError> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    if mode != LoggingMode::Silent && is_initialized() {
        tracing::debug!("Global subscriber already installed; keeping it");
        return Ok(());
    }

    match mode {
        LoggingMode::Silent => Ok(()),
        LoggingMode::Development => {
            let filter = create_env_filter("info");

            let subscriber = Registry::default()
                .with(
                    fmt::layer()
                        .with_target(false)
                        .with_thread_ids(false)
                        .with_file(false)
                        .with_line_number(false)
                        .compact(),
                )
                .with(filter);

            subscriber
                .try_init()
                .map_err(|e| LoggingError::TracingInit(e.to_string()))
        }
        LoggingMode::Debug => {
            let filter = create_env_filter("debug");

            let subscriber = Registry::default()
                .with(
                    fmt::layer()
                        .pretty()
                        .with_thread_ids(true)
                        .with_thread_names(true)
                        .with_file(true)
                        .with_line_number(true),
                )
                .with(filter);

            subscriber
                .try_init()
                .map_err(|e| LoggingError::TracingInit(e.to_string()))
        }
    }
}

/// Initialize logging from environment variables
///
/// Reads `FCM2UP_LOG_MODE`:
/// - "development" -> LoggingMode::Development
/// - "debug" -> LoggingMode::Debug
/// - anything else -> LoggingMode::Silent
pub fn init_logging_from_env() -> Result<(), LoggingError> {
    init_logging(mode_from_env_value(std::env::var("FCM2UP_LOG_MODE").ok().as_deref()))
}

fn mode_from_env_value(value: Option<&str>) -> LoggingMode {
    match value {
        Some("development") => LoggingMode::Development,
        Some("debug") => LoggingMode::Debug,
        _ => LoggingMode::Silent,
    }
}

/// Create an environment filter with fallback to default level
fn create_env_filter(default_level: &str) -> EnvFilter {
    if let Ok(level) = std::env::var("FCM2UP_LOG_LEVEL") {
        EnvFilter::new(level)
    } else if let Ok(rust_log) = std::env::var("RUST_LOG") {
        EnvFilter::new(rust_log)
    } else {
        EnvFilter::new(default_level)
    }
}

/// Check if a global subscriber has been installed
pub fn is_initialized() -> bool {
    tracing::dispatcher::has_been_set()
}

/// Shorten a token for log output
///
/// Tokens are credentials; logs only ever carry a short prefix.
pub fn redact(token: &str) -> String {
    match token.char_indices().nth(REDACTED_PREFIX) {
        Some((end, _)) => format!("{}...", &token[..end]),
        None => token.to_string(),
    }
}
