//! Process-wide `tracing` subscriber setup.
//!
//! A thin wrapper over `tracing-subscriber`'s `fmt` layer and `EnvFilter`:
//! every binary in the workspace calls [`init`] once at startup instead of
//! assembling the layer stack itself.

mod format;

use thiserror::Error;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Error returned when the subscriber fails to initialize.
#[derive(Debug, Error)]
pub enum LogError {
    /// `level` failed to parse as an `EnvFilter` directive string.
    #[error("invalid log level '{level}': {source}")]
    InvalidLevel {
        level: String,
        #[source]
        source: tracing_subscriber::filter::ParseError,
    },
}

/// Logger configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// `EnvFilter` directive string, e.g. `"info"` or `"nebula_engine=debug,warn"`.
    pub level: String,
    /// Whether to colorize output. Disable for non-terminal sinks (files, CI logs).
    pub ansi: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            ansi: true,
        }
    }
}

impl Config {
    /// Read `level` from the `RUST_LOG` environment variable, falling back
    /// to `"info"` if unset.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            level: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            ..Self::default()
        }
    }
}

/// Install the global `tracing` subscriber. Call once, at process startup.
///
/// # Errors
///
/// Returns [`LogError::InvalidLevel`] if `config.level` isn't a valid
/// `EnvFilter` directive string.
pub fn init(config: &Config) -> Result<(), LogError> {
    let filter = EnvFilter::try_new(&config.level).map_err(|source| LogError::InvalidLevel {
        level: config.level.clone(),
        source,
    })?;

    let fmt_layer = fmt::layer()
        .with_ansi(config.ansi)
        .with_timer(format::make_timer(None));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .ok();

    Ok(())
}

/// Convenience for [`init`] with [`Config::from_env`].
///
/// # Errors
///
/// Returns [`LogError::InvalidLevel`] if `RUST_LOG` isn't a valid
/// `EnvFilter` directive string.
pub fn init_from_env() -> Result<(), LogError> {
    init(&Config::from_env())
}
