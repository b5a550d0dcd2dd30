//! Tracing bootstrap for hosts that embed the registry
//!
//! The library only emits `tracing` events; installing a subscriber is the
//! host's choice. `init_logging` is a convenience for hosts that want the
//! default compact stderr output. It is idempotent and never panics.

use once_cell::sync::OnceCell;
use thiserror::Error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static LOGGING_LEVEL: OnceCell<&'static str> = OnceCell::new();

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoggingError {
    #[error("unsupported log level `{0}`")]
    UnsupportedLevel(String),
    #[error("logging already initialized at `{active}`; refusing to switch to `{requested}`")]
    LevelMismatch {
        active: &'static str,
        requested: &'static str,
    },
    #[error("failed to install subscriber: {0}")]
    Install(String),
}

/// Install a global subscriber filtering at `level` unless `RUST_LOG` is set.
///
/// Repeating the call with the same level is a no-op.
pub fn init_logging(level: &str) -> Result<(), LoggingError> {
    let level = normalize_level(level)?;

    if let Some(active) = LOGGING_LEVEL.get() {
        if *active != level {
            return Err(LoggingError::LevelMismatch {
                active,
                requested: level,
            });
        }
        return Ok(());
    }

    LOGGING_LEVEL
        .get_or_try_init(|| -> Result<&'static str, LoggingError> {
            let filter = EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(level));
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().compact().with_target(false))
                .try_init()
                .map_err(|err| LoggingError::Install(err.to_string()))?;
            Ok(level)
        })
        .map(|_| ())
}

/// Level the subscriber was installed with, if any
pub fn active_level() -> Option<&'static str> {
    LOGGING_LEVEL.get().copied()
}

fn normalize_level(level: &str) -> Result<&'static str, LoggingError> {
    match level.trim().to_ascii_lowercase().as_str() {
        "trace" => Ok("trace"),
        "debug" => Ok("debug"),
        "info" => Ok("info"),
        "warn" | "warning" => Ok("warn"),
        "error" => Ok("error"),
        other => Err(LoggingError::UnsupportedLevel(other.to_string())),
    }
}
