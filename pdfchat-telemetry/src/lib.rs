//! # pdfchat-telemetry
//!
//! Logging setup shared by the pdfchat binaries.
//!
//! [`init_telemetry`] installs a global `tracing` subscriber that writes to
//! stderr, filtered by `RUST_LOG` (falling back to the configured level).
//! [`capture`] provides an in-memory layer for asserting on log events in tests.

mod capture;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

pub use capture::{CaptureLayer, CapturedEvent, CapturedEvents, capture};

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("invalid log level '{0}'")]
    InvalidLevel(String),

    #[error("invalid log format '{0}', expected compact, pretty or json")]
    InvalidFormat(String),

    #[error("failed to install subscriber: {0}")]
    Init(String),
}

pub type Result<T> = std::result::Result<T, TelemetryError>;

/// Output format of log lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Pretty,
    /// One JSON object per line, with the current span's fields.
    Json,
}

impl FromStr for LogFormat {
    type Err = TelemetryError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(TelemetryError::InvalidFormat(other.to_string())),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Compact => "compact",
            Self::Pretty => "pretty",
            Self::Json => "json",
        })
    }
}

/// Subscriber settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    pub format: LogFormat,
    /// Level used when `RUST_LOG` is unset.
    pub default_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self { format: LogFormat::Compact, default_level: "info".to_string() }
    }
}

fn parse_level(level: &str) -> Result<LevelFilter> {
    LevelFilter::from_str(level).map_err(|_| TelemetryError::InvalidLevel(level.to_string()))
}

/// Build the filter: `RUST_LOG` directives, or `default_level` when unset.
pub fn env_filter(default_level: &str) -> Result<EnvFilter> {
    let level = parse_level(default_level)?;
    Ok(EnvFilter::builder().with_default_directive(level.into()).from_env_lossy())
}

/// Install the global subscriber.
///
/// # Errors
///
/// Fails on an invalid level, or if a global subscriber is already set.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<()> {
    let filter = env_filter(&config.default_level)?;
    let registry = tracing_subscriber::registry().with(filter);

    let installed = match config.format {
        LogFormat::Compact => registry
            .with(tracing_subscriber::fmt::layer().compact().with_writer(std::io::stderr))
            .try_init(),
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().pretty().with_writer(std::io::stderr))
            .try_init(),
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(false)
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .try_init(),
    };
    installed.map_err(|e| TelemetryError::Init(e.to_string()))
}
