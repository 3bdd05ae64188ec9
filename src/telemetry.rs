//! Tracing subscriber setup for the binary.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::{LogFormat, LoggingConfig};
use crate::{Error, Result};

/// Build the env filter: `RUST_LOG` if set, otherwise `config.level`.
///
/// # Errors
///
/// Returns `Config` if `config.level` is not a valid filter directive.
pub fn env_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(&config.level)
            .map_err(|e| Error::Config(format!("invalid logging.level '{}': {e}", config.level))),
    }
}

/// Install the global subscriber. Logs go to stderr.
///
/// # Errors
///
/// Returns `Config` for a bad level, or `Other` if a subscriber is already set.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let filter = env_filter(config)?;
    let registry = tracing_subscriber::registry().with(filter);
    let installed = match config.format {
        LogFormat::Text => registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .try_init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
    };
    installed.map_err(|e| Error::Other(format!("failed to install tracing subscriber: {e}")))
}
