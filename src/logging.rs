use std::sync::Once;
use std::fs;
use tracing_subscriber::{fmt, EnvFilter, prelude::*};
use crate::config::LoggingConfig;
use crate::error::CoordError;

static INIT: Once = Once::new();

fn filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Install the global subscriber: console output, plus daily-rolling JSON
/// files when a directory is configured. Later calls are no-ops.
pub fn init(config: &LoggingConfig) -> Result<(), CoordError> {
    let mut result = Ok(());
    INIT.call_once(|| {
        result = install(config);
    });
    result
}

fn install(config: &LoggingConfig) -> Result<(), CoordError> {
    let console = fmt::Layer::new()
        .with_target(true)
        .with_thread_ids(true)
        .with_ansi(true)
        .with_filter(filter(&config.level));

    let file = match &config.directory {
        Some(dir) => {
            fs::create_dir_all(dir)?;
            let appender = tracing_appender::rolling::RollingFileAppender::builder()
                .rotation(tracing_appender::rolling::Rotation::DAILY)
                .filename_prefix("exam-coord")
                .filename_suffix("log")
                .build(dir)
                .map_err(|e| CoordError::system(format!("Failed to create file appender: {}", e)))?;
            Some(
                fmt::Layer::new()
                    .json()
                    .with_writer(appender)
                    .with_file(true)
                    .with_line_number(true)
                    .with_thread_ids(true)
                    .with_target(true)
                    .with_ansi(false)
                    .with_filter(filter(&config.level)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(console)
        .with(file)
        .try_init()
        .map_err(|e| CoordError::system(format!("Failed to set tracing subscriber: {}", e)))
}
