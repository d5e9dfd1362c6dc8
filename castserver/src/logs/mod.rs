//! Tracing subscriber setup.

use castconfig::get_config;
use tracing::Level;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Subscriber options
#[derive(Debug, Clone)]
pub struct LoggingOptions {
    /// Default level, used when `RUST_LOG` is not set
    pub min_level: Level,
    /// Log to stderr
    pub enable_console: bool,
}

impl Default for LoggingOptions {
    fn default() -> Self {
        Self {
            min_level: Level::INFO,
            enable_console: true,
        }
    }
}

impl LoggingOptions {
    pub fn from_config() -> Self {
        let config = get_config();
        Self {
            min_level: string_to_level(&config.get_log_min_level()).unwrap_or(Level::INFO),
            enable_console: config.get_log_enable_console(),
        }
    }
}

/// Installs the global subscriber. `RUST_LOG` takes precedence over
/// `options.min_level`. Calling it again is a no-op.
pub fn init_logging(options: LoggingOptions) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level_to_string(options.min_level)));

    let console = options.enable_console.then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_level(true)
            .with_writer(std::io::stderr)
    });

    // Err only means a subscriber is already installed.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .try_init();
}

pub fn string_to_level(s: &str) -> Option<Level> {
    match s.trim().to_uppercase().as_str() {
        "ERROR" => Some(Level::ERROR),
        "WARN" | "WARNING" => Some(Level::WARN),
        "INFO" => Some(Level::INFO),
        "DEBUG" => Some(Level::DEBUG),
        "TRACE" => Some(Level::TRACE),
        _ => None,
    }
}

fn level_to_string(level: Level) -> &'static str {
    match level {
        Level::ERROR => "error",
        Level::WARN => "warn",
        Level::INFO => "info",
        Level::DEBUG => "debug",
        Level::TRACE => "trace",
    }
}
