//! Tracing subscriber setup.
//!
//! Console output goes to stderr (human or JSON). The worker daemon also
//! writes a daily-rotated file under `<data_dir>/logs/`.

use std::path::Path;
use std::str::FromStr;

use anyhow::{Result, anyhow};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pretty" | "text" | "human" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format '{}' (expected pretty or json)", other)),
        }
    }
}

/// Where and how to log.
#[derive(Debug, Clone)]
pub struct TelemetryConfig<'a> {
    pub level: &'a str,
    pub format: LogFormat,
    /// `(directory, file name prefix)` for the rolling log file, if any.
    pub file: Option<(&'a Path, &'a str)>,
}

/// `RUST_LOG` wins over the configured level.
fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Install the global subscriber. Keep the returned guard alive for the
/// process lifetime so buffered file output is flushed on exit.
pub fn init(config: &TelemetryConfig<'_>) -> Result<Option<WorkerGuard>> {
    let console = match config.format {
        LogFormat::Pretty => fmt::layer().with_writer(std::io::stderr).with_target(false).boxed(),
        LogFormat::Json => fmt::layer().json().with_writer(std::io::stderr).boxed(),
    };

    let (file_layer, guard) = match config.file {
        Some((dir, name)) => {
            std::fs::create_dir_all(dir)
                .map_err(|e| anyhow!("Failed to create log directory {}: {}", dir.display(), e))?;
            let appender = tracing_appender::rolling::daily(dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().json().with_writer(writer).with_ansi(false).boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter(config.level))
        .with(console)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow!("Failed to initialize logging: {}", e))?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_parsing() {
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("Pretty".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert!("xml".parse::<LogFormat>().is_err());
    }
}
