//! Tracing subscriber setup

use std::fs;
use std::path::PathBuf;

use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{EnvFilter, fmt};

use crate::config::LoggingConfig;

const LOG_FILE_NAME: &str = "gateway-version.log";

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("Failed to create log directory {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid log filter: {0}")]
    Filter(#[from] ParseError),

    #[error("Failed to install subscriber: {0}")]
    Init(#[from] TryInitError),
}

/// Install the global subscriber
///
/// `RUST_LOG` takes precedence over the configured level. Logs go to a daily
/// rotated file when a directory or file logging is configured, otherwise to
/// stderr. Keep the
/// returned guard alive until shutdown so buffered lines are flushed.
pub fn init_logging(config: &LoggingConfig) -> Result<WorkerGuard, LoggingError> {
    let filter = build_filter(&config.level, std::env::var("RUST_LOG").ok())?;

    let directory = config.log_directory();
    let (writer, guard) = match &directory {
        Some(dir) => {
            fs::create_dir_all(dir).map_err(|source| LoggingError::Io {
                path: dir.clone(),
                source,
            })?;
            tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, LOG_FILE_NAME))
        }
        None => tracing_appender::non_blocking(std::io::stderr()),
    };

    let registry = tracing_subscriber::registry().with(filter);
    if config.json {
        registry
            .with(fmt::layer().json().with_writer(writer).with_ansi(false))
            .try_init()?;
    } else {
        registry
            .with(
                fmt::layer()
                    .with_writer(writer)
                    .with_ansi(directory.is_none()),
            )
            .try_init()?;
    }

    Ok(guard)
}

fn build_filter(level: &str, env: Option<String>) -> Result<EnvFilter, ParseError> {
    match env.filter(|directives| !directives.trim().is_empty()) {
        Some(directives) => EnvFilter::try_new(directives),
        None => EnvFilter::try_new(level),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_uses_configured_level_without_env() {
        let filter = build_filter("debug", None).unwrap();

        assert!(filter.to_string().contains("debug"));
    }

    #[test]
    fn filter_prefers_env_directives() {
        let filter = build_filter("info", Some("gateway_version=trace".to_string())).unwrap();

        assert!(filter.to_string().contains("gateway_version=trace"));
    }

    #[test]
    fn blank_env_falls_back_to_level() {
        let filter = build_filter("warn", Some("  ".to_string())).unwrap();

        assert!(filter.to_string().contains("warn"));
    }

    #[test]
    fn invalid_level_is_rejected() {
        assert!(build_filter("gateway_version=loud", None).is_err());
    }
}
