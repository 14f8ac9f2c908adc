//! Shared logging configuration and run lifecycle events.

use std::env;
use std::path::Path;

use thiserror::Error;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::dataset::{DatasetError, DatasetReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
    pub include_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            include_target: true,
        }
    }
}

#[derive(Debug, Error)]
pub enum LoggingInitError {
    #[error("logging already initialized: {0}")]
    AlreadyInitialized(#[from] tracing::subscriber::SetGlobalDefaultError),
}

pub const LOG_LEVEL_ENV: &str = "CAROUSEL_LOG_LEVEL";
pub const LOG_FORMAT_ENV: &str = "CAROUSEL_LOG_FORMAT";
pub const LOG_TARGET_ENV: &str = "CAROUSEL_LOG_TARGET";

pub fn logging_config_from_env() -> LoggingConfig {
    logging_config_from_lookup(|key| env::var(key).ok())
}

/// Builds the config from any key lookup; unusable values keep the default.
pub fn logging_config_from_lookup(lookup: impl Fn(&str) -> Option<String>) -> LoggingConfig {
    let defaults = LoggingConfig::default();
    LoggingConfig {
        level: lookup(LOG_LEVEL_ENV)
            .map(|level| level.trim().to_string())
            .filter(|level| !level.is_empty())
            .unwrap_or(defaults.level),
        format: lookup(LOG_FORMAT_ENV)
            .and_then(|format| parse_log_format(&format))
            .unwrap_or(defaults.format),
        include_target: lookup(LOG_TARGET_ENV)
            .and_then(|target| parse_bool(&target))
            .unwrap_or(defaults.include_target),
    }
}

pub fn init_logging(config: &LoggingConfig) -> Result<(), LoggingInitError> {
    let env_filter =
        EnvFilter::try_new(config.level.clone()).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(config.include_target)
        .with_ansi(matches!(config.format, LogFormat::Pretty))
        .with_writer(std::io::stderr);

    match config.format {
        LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish())?,
        LogFormat::Pretty => tracing::subscriber::set_global_default(builder.pretty().finish())?,
    }

    Ok(())
}

pub fn log_run_start(config: &LoggingConfig, input_dir: &Path, output: &Path) {
    info!(
        component = "build_dataset",
        event = "run.start",
        log_level = %config.level,
        log_format = ?config.format,
        input_dir = %input_dir.display(),
        output = %output.display()
    );
}

pub fn log_run_finish(report: &DatasetReport) {
    match report.target_week {
        Some(week) => info!(
            component = "build_dataset",
            event = "run.finish",
            output = %report.output.display(),
            impressions = report.impressions,
            taps = report.taps,
            payments = report.payments,
            week_start = %week.start,
            week_end = %week.end,
            output_rows = report.output_rows,
            clicked_rows = report.clicked_rows,
            output_sha256 = %report.output_sha256
        ),
        None => info!(
            component = "build_dataset",
            event = "run.finish",
            output = %report.output.display(),
            impressions = report.impressions,
            taps = report.taps,
            payments = report.payments,
            output_rows = report.output_rows,
            output_sha256 = %report.output_sha256
        ),
    }
}

pub fn log_run_failed(err: &DatasetError) {
    error!(
        component = "build_dataset",
        event = "run.failed",
        error = %err
    );
}

fn parse_log_format(raw: &str) -> Option<LogFormat> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "json" => Some(LogFormat::Json),
        "pretty" => Some(LogFormat::Pretty),
        _ => None,
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
