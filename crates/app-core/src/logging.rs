//! Logging initialization for the app core.
//!
//! All native components share one tracing subscriber; the shell embedding
//! this core calls [`init_logging`] once at startup.

use std::sync::Once;
use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

/// Initialize the logging system.
///
/// Sets up tracing with:
/// - Log level from the RUST_LOG env var or the provided default
/// - Compact human-readable output on stderr
///
/// Safe to call more than once; only the first call installs a subscriber.
///
/// # Example
///
/// ```ignore
/// init_logging("info");
/// tracing::info!("App core started");
/// ```
pub fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_string()));

    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(true)
            .compact()
            .init();
    });
}

/// Parse a log level string into a tracing Level.
pub fn parse_level(level: &str) -> tracing::Level {
    match level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" | "warning" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    }
}
