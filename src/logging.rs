//! Logging setup for `fleetcmd` using `tracing` + `tracing-subscriber`.
//!
//! Priority for determining the log level:
//! 1. `--log-level` CLI flag
//! 2. `FLEETCMD_LOG` environment variable (read by clap for the same flag)
//! 3. default to `info`
//!
//! Logs go to stderr so stdout carries only command output.

use tracing::Level;
use tracing_subscriber::fmt;

use crate::cli::LogLevel;

/// Installs the global subscriber.
///
/// # Errors
///
/// Returns the subscriber error message when a global subscriber is already
/// installed.
pub(crate) fn init_logging(level: Option<LogLevel>) -> Result<(), String> {
    fmt()
        .with_max_level(resolve_level(level))
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|err| err.to_string())
}

pub(crate) const fn resolve_level(level: Option<LogLevel>) -> Level {
    match level {
        Some(LogLevel::Error) => Level::ERROR,
        Some(LogLevel::Warn) => Level::WARN,
        None | Some(LogLevel::Info) => Level::INFO,
        Some(LogLevel::Debug) => Level::DEBUG,
        Some(LogLevel::Trace) => Level::TRACE,
    }
}
