//! Process-wide tracing subscriber setup

use tracing::Level;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LoggingConfig;
use crate::error::AppError;

/// Map a configured level name to a filter; unknown names mean `info`
pub fn parse_level(log_level: &str) -> LevelFilter {
    let level = match log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    LevelFilter::from_level(level)
}

/// Initialize the global tracing subscriber
///
/// `format: pretty` selects human-readable output; anything else logs JSON.
pub fn init_tracing(config: &LoggingConfig) -> Result<(), AppError> {
    let filter = parse_level(&config.level);

    if config.format.eq_ignore_ascii_case("pretty") {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().pretty())
            .try_init()
            .map_err(|e| AppError::Logging(e.to_string()))?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .map_err(|e| AppError::Logging(e.to_string()))?;
    }

    Ok(())
}
