//! Tracing setup for garden hosts
//!
//! Library code only emits events; binaries and test harnesses call
//! [`init_tracing`] once to install a subscriber.

use crate::{Error, Result};
use std::io;
use std::sync::OnceLock;
pub use tracing::Level;
use tracing_subscriber::{filter::EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

/// Tracing output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TracingFormat {
    /// Pretty-printed human-readable format
    Pretty,
    /// Compact single-line format
    Compact,
    /// Structured JSON format
    Json,
    /// Development format with file locations
    Dev,
}

impl std::str::FromStr for TracingFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            "dev" => Ok(Self::Dev),
            _ => Err(Error::configuration_with_help(
                format!("Unknown tracing format: {s}"),
                "Use one of: pretty, compact, json, dev",
            )),
        }
    }
}

/// Tracing configuration
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Output format
    pub format: TracingFormat,
    /// Level for garden crates when no filter is given
    pub level: Level,
    /// Include file and line in `Dev` output
    pub enable_file_location: bool,
    /// Explicit `EnvFilter` directive, overriding `RUST_LOG` and `level`
    pub filter: Option<String>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            format: TracingFormat::Pretty,
            level: Level::WARN,
            enable_file_location: true,
            filter: None,
        }
    }
}

static CORRELATION_ID: OnceLock<Uuid> = OnceLock::new();

/// Correlation ID shared by every solve in this process
pub fn correlation_id() -> Uuid {
    *CORRELATION_ID.get_or_init(Uuid::new_v4)
}

fn default_directive(level: Level) -> String {
    let level = level.as_str().to_lowercase();
    format!("garden_core={level},garden_graph={level},garden_cache={level}")
}

/// Install a global subscriber.
///
/// # Errors
///
/// Fails on an invalid filter directive, or when a global subscriber is
/// already installed.
pub fn init_tracing(config: TracingConfig) -> Result<()> {
    let correlation_id = correlation_id();

    let env_filter = match config.filter {
        Some(filter) => EnvFilter::try_new(filter),
        None => EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(default_directive(config.level))),
    }
    .map_err(|e| Error::configuration(format!("Failed to create tracing filter: {e}")))?;

    let registry = tracing_subscriber::registry().with(env_filter);

    let installed = match config.format {
        TracingFormat::Pretty => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .pretty()
                    .with_writer(io::stderr)
                    .with_target(true),
            )
            .try_init(),
        TracingFormat::Compact => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .compact()
                    .with_writer(io::stderr)
                    .with_target(false),
            )
            .try_init(),
        TracingFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(io::stderr)
                    .with_current_span(true)
                    .with_span_list(true),
            )
            .try_init(),
        TracingFormat::Dev => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(io::stderr)
                    .with_file(config.enable_file_location)
                    .with_line_number(config.enable_file_location)
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_level(true),
            )
            .try_init(),
    };
    installed.map_err(|e| Error::configuration(format!("Failed to install tracing subscriber: {e}")))?;

    tracing::info!(
        correlation_id = %correlation_id,
        version = env!("CARGO_PKG_VERSION"),
        format = ?config.format,
        "Tracing initialized"
    );

    Ok(())
}
