// src/utils/logging.rs
use tracing_subscriber::{fmt, EnvFilter};

/// Sets up the logging framework using tracing_subscriber.
/// `RUST_LOG` wins when set; otherwise `default_level` (from `LOG_LEVEL`) applies.
pub fn setup_logging(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info")); // Unparsable level falls back to INFO

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    tracing::debug!("Logging setup complete.");
}
