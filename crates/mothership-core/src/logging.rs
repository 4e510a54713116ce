//! Structured logging via `tracing`.
//!
//! Initialise once at startup. `RUST_LOG` overrides the configured level.
//! The monitor owns the terminal while it runs, so it routes logs to a file;
//! the admin CLI logs to stderr.
//!
//! Field names used across the workspace: `rack`, `chassis`, `valve`,
//! `filter`, `position`, `tab_key`, `peer`.

use std::io;
use std::path::PathBuf;
use std::sync::OnceLock;

use thiserror::Error;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingConfig;

static LOGGING_INITIALIZED: OnceLock<bool> = OnceLock::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Console,
    Json,
}

impl LogFormat {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "json" => Self::Json,
            _ => Self::Console,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogTarget {
    Stderr,
    File(PathBuf),
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: String,
    pub format: LogFormat,
    pub target: LogTarget,
}

impl LogConfig {
    pub fn from_config(cfg: &LoggingConfig, target: LogTarget) -> Self {
        Self {
            level: cfg.level.clone(),
            format: LogFormat::parse(&cfg.format),
            target,
        }
    }
}

#[derive(Debug, Error)]
pub enum LogError {
    #[error("logging already initialized")]
    AlreadyInitialized,
    #[error("failed to create log file: {0}")]
    FileCreate(#[from] io::Error),
    #[error("failed to set global subscriber: {0}")]
    SetSubscriber(#[from] tracing::subscriber::SetGlobalDefaultError),
}

pub fn init_logging(config: &LogConfig) -> Result<(), LogError> {
    if LOGGING_INITIALIZED.get().is_some() {
        return Err(LogError::AlreadyInitialized);
    }

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    match (&config.target, config.format) {
        (LogTarget::Stderr, LogFormat::Console) => {
            let subscriber = tracing_subscriber::registry().with(env_filter).with(
                fmt::layer()
                    .with_writer(io::stderr)
                    .with_target(true)
                    .with_ansi(true),
            );
            tracing::subscriber::set_global_default(subscriber)?;
        }
        (LogTarget::Stderr, LogFormat::Json) => {
            let subscriber = tracing_subscriber::registry().with(env_filter).with(
                fmt::layer()
                    .json()
                    .with_writer(io::stderr)
                    .with_target(true)
                    .flatten_event(true),
            );
            tracing::subscriber::set_global_default(subscriber)?;
        }
        (LogTarget::File(path), format) => {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            if format == LogFormat::Json {
                let subscriber = tracing_subscriber::registry().with(env_filter).with(
                    fmt::layer()
                        .json()
                        .with_writer(file)
                        .with_target(true)
                        .flatten_event(true),
                );
                tracing::subscriber::set_global_default(subscriber)?;
            } else {
                let subscriber = tracing_subscriber::registry().with(env_filter).with(
                    fmt::layer()
                        .with_writer(file)
                        .with_target(true)
                        .with_ansi(false),
                );
                tracing::subscriber::set_global_default(subscriber)?;
            }
        }
    }

    let _ = LOGGING_INITIALIZED.set(true);
    tracing::info!(log_level = %config.level, log_target = ?config.target, "logging initialized");
    Ok(())
}

pub fn is_initialized() -> bool {
    LOGGING_INITIALIZED.get().is_some()
}
