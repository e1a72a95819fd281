//! Logging setup for the binary

use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingConfig;

/// Installs the global subscriber. `RUST_LOG` wins over the configured level.
/// Logs go to stderr so stdout stays clean for command output.
pub fn init(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    // a second init (tests, embedding) keeps the first subscriber
    let _ = if logging.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}
