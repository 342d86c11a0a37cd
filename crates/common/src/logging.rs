//! Tracing setup
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::{ConfigError, ConfigResult};

/// Install a global fmt subscriber.
///
/// `RUST_LOG` takes precedence over `log_level` when set.
pub fn init_tracing(log_level: &str) -> ConfigResult<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .try_init()
        .map_err(|e| ConfigError::Invalid(format!("Failed to initialize logging: {}", e)))?;

    tracing::debug!("Logging initialized at level {}", log_level);
    Ok(())
}
