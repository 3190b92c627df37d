//! Logging utilities
//!
//! Provides logging configuration and helpers.

use anyhow::{Context, Result};
use std::path::Path;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use crate::config::LogConfig;

/// Log level configuration
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn to_tracing_level(self) -> Level {
        match self {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "trace" => Some(LogLevel::Trace),
            "debug" => Some(LogLevel::Debug),
            "info" => Some(LogLevel::Info),
            "warn" | "warning" => Some(LogLevel::Warn),
            "error" => Some(LogLevel::Error),
            _ => None,
        }
    }
}

/// Log output encoding
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Console,
}

impl LogFormat {
    /// Anything other than `console` is JSON
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "console" | "text" | "pretty" => LogFormat::Console,
            _ => LogFormat::Json,
        }
    }
}

/// Filter directive for the configured level; `RUST_LOG` wins when set
fn build_filter(level: LogLevel) -> EnvFilter {
    let default = format!(
        "k8s_service_provider={level},tower_http={level},kube=warn,warn",
        level = level.to_tracing_level()
    );
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

/// Initialize the logger from configuration
///
/// The returned guard flushes the file writer and must outlive the program.
pub fn init_logger(config: &LogConfig) -> Result<Option<WorkerGuard>> {
    let level = LogLevel::from_str(&config.level).unwrap_or(LogLevel::Info);
    let format = LogFormat::from_str(&config.format);
    let filter = build_filter(level);

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    let to_stdout = config.output_path.is_empty() || config.output_path == "stdout";
    if to_stdout {
        match format {
            LogFormat::Json => builder.json().flatten_event(true).try_init(),
            LogFormat::Console => builder.compact().try_init(),
        }
        .map_err(|e| anyhow::anyhow!("Failed to install logger: {e}"))?;
        return Ok(None);
    }

    let path = Path::new(&config.output_path);
    let directory = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .context("Log output path has no file name")?;
    std::fs::create_dir_all(directory).context("Failed to create log directory")?;

    let appender = tracing_appender::rolling::never(directory, file_name);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let builder = builder.with_writer(writer).with_ansi(false);

    match format {
        LogFormat::Json => builder.json().flatten_event(true).try_init(),
        LogFormat::Console => builder.compact().try_init(),
    }
    .map_err(|e| anyhow::anyhow!("Failed to install logger: {e}"))?;

    Ok(Some(guard))
}
