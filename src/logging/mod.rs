//! Structured logging
//!
//! Installs a `tracing` subscriber writing either human-readable lines or
//! one JSON object per event to stderr. The filter comes from
//! `REELGRAB_LOG`, then `RUST_LOG`, then defaults to `info`; the output
//! format from `LOG_FORMAT` (`json` or `plaintext`).

pub mod redact;

use thiserror::Error;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry};

pub const DEFAULT_FILTER: &str = "info";

/// Logging error types
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid log filter {filter:?}: {reason}")]
    InvalidFilter { filter: String, reason: String },

    #[error("unknown LOG_FORMAT {0:?}: expected json or plaintext")]
    UnknownFormat(String),

    #[error("logging already initialized: {0}")]
    AlreadyInitialized(String),
}

/// Output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Plaintext,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = LoggingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "plaintext" | "plain" | "text" => Ok(LogFormat::Plaintext),
            other => Err(LoggingError::UnknownFormat(other.to_string())),
        }
    }
}

/// Tracing configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracingConfig {
    pub service_name: String,
    /// `EnvFilter` directive string, e.g. `info,reelgrab=debug`.
    pub filter: String,
    pub format: LogFormat,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            service_name: env!("CARGO_PKG_NAME").to_string(),
            filter: DEFAULT_FILTER.to_string(),
            format: LogFormat::Plaintext,
        }
    }
}

impl TracingConfig {
    pub fn from_env() -> Result<Self, LoggingError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, LoggingError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let filter = get("REELGRAB_LOG")
            .or_else(|| get("RUST_LOG"))
            .unwrap_or_else(|| DEFAULT_FILTER.to_string());
        let format = match get("LOG_FORMAT") {
            Some(raw) => raw.parse()?,
            None => LogFormat::default(),
        };

        Ok(Self {
            filter,
            format,
            ..Self::default()
        })
    }
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_tracing(config: &TracingConfig) -> Result<(), LoggingError> {
    let env_filter =
        EnvFilter::try_new(&config.filter).map_err(|e| LoggingError::InvalidFilter {
            filter: config.filter.clone(),
            reason: e.to_string(),
        })?;

    let result = match config.format {
        LogFormat::Json => Registry::default()
            .with(env_filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_writer(std::io::stderr),
            )
            .try_init(),
        LogFormat::Plaintext => Registry::default()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init(),
    };
    result.map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))?;

    info!(service = %config.service_name, format = ?config.format, "logging initialized");
    Ok(())
}
