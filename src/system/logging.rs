//! Logging system initialization
//!
//! This module provides functions to initialize the tracing/logging system
//! based on application configuration.

use anyhow::Context;
use tracing_appender::rolling;

use crate::config::LoggingConfig;

/// Initialize logging system based on configuration
///
/// This sets up the logging system according to the loaded configuration,
/// including file output, log rotation, and formatting.
///
/// **Note**: This should be called only once during application startup,
/// after the configuration has been loaded.
///
/// # Returns
/// * `WorkerGuard` - Must be kept alive for the duration of the program
///   to ensure non-blocking log writes are flushed
///
/// # Errors
/// * If creating the log appender or opening the log file fails
/// * If a global subscriber has already been installed
pub fn init_logging(
    config: &LoggingConfig,
) -> anyhow::Result<tracing_appender::non_blocking::WorkerGuard> {
    let writer: Box<dyn std::io::Write + Send + Sync> = match config.file.as_deref() {
        Some(log_file) if !log_file.is_empty() && config.enable_rotation => {
            let path = std::path::Path::new(log_file);
            let dir = path.parent().unwrap_or(std::path::Path::new("."));
            let filename = path
                .file_name()
                .and_then(|f| f.to_str())
                .unwrap_or("clicktrail.log");
            let appender = rolling::Builder::new()
                .rotation(rolling::Rotation::DAILY)
                .filename_prefix(filename.trim_end_matches(".log"))
                .filename_suffix("log")
                .max_log_files(config.max_backups as usize)
                .build(dir)
                .context("Failed to create rolling log appender")?;
            Box::new(appender)
        }
        Some(log_file) if !log_file.is_empty() => {
            // Non-rotating, append to file
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(log_file)
                .with_context(|| format!("Failed to open log file {}", log_file))?;
            Box::new(file)
        }
        _ => Box::new(std::io::stdout()),
    };

    let (non_blocking_writer, guard) = tracing_appender::non_blocking(writer);
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.level.clone()));

    let subscriber_builder = tracing_subscriber::fmt()
        .with_writer(non_blocking_writer)
        .with_env_filter(filter)
        .with_level(true)
        .with_ansi(config.file.as_ref().is_none_or(|f| f.is_empty()));

    let installed = if config.format == "json" {
        subscriber_builder.json().try_init()
    } else {
        subscriber_builder.try_init()
    };
    installed.map_err(|e| anyhow::anyhow!("Failed to install tracing subscriber: {}", e))?;

    Ok(guard)
}
