//! Logging Infrastructure
//!
//! Console logging by default, daily rolling files when a log directory is
//! configured and exists, JSON lines when requested.

use std::path::Path;

/// Initialize the logger from `NETPRINT_LOG_LEVEL`, `NETPRINT_LOG_JSON`
/// and `NETPRINT_LOG_DIR`
pub fn init_logger() {
    let level = std::env::var("NETPRINT_LOG_LEVEL").ok();
    let json = std::env::var("NETPRINT_LOG_JSON")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(false);
    let dir = std::env::var("NETPRINT_LOG_DIR").ok();
    init_logger_with_file(level.as_deref(), json, dir.as_deref());
}

/// Initialize the logger with optional file output
///
/// An unknown level falls back to `info`; a missing directory falls back
/// to stdout.
pub fn init_logger_with_file(log_level: Option<&str>, json: bool, log_dir: Option<&str>) {
    let level = log_level
        .and_then(|l| l.parse().ok())
        .unwrap_or(tracing::Level::INFO);

    let file_appender = log_dir
        .map(Path::new)
        .filter(|dir| dir.is_dir())
        .map(|dir| tracing_appender::rolling::daily(dir, "netprint.log"));

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_file(false)
        .with_line_number(false)
        .with_thread_ids(false)
        .with_target(false);

    match (json, file_appender) {
        (true, Some(appender)) => subscriber.json().with_writer(appender).init(),
        (true, None) => subscriber.json().init(),
        (false, Some(appender)) => subscriber.with_ansi(false).with_writer(appender).init(),
        (false, None) => subscriber.init(),
    }
}
