//! Tracing subscriber setup

use crate::ObservabilityError;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};
use weft_core::{LogFormat, ObservabilityConfig};

/// Build the filter: `RUST_LOG` when set, otherwise `config.log_level`.
pub fn env_filter(config: &ObservabilityConfig) -> Result<EnvFilter, ObservabilityError> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(&config.log_level)
            .map_err(|e| ObservabilityError::InvalidFilter(e.to_string())),
    }
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_tracing(config: &ObservabilityConfig) -> Result<(), ObservabilityError> {
    let registry = tracing_subscriber::registry().with(env_filter(config)?);

    let installed = match config.log_format {
        LogFormat::Json => registry.with(fmt::layer().json()).try_init(),
        LogFormat::Pretty => registry.with(fmt::layer().pretty()).try_init(),
    };
    installed.map_err(|e| ObservabilityError::TracingInit(e.to_string()))?;

    tracing::info!(
        log_level = %config.log_level,
        log_format = ?config.log_format,
        "Initialized structured tracing"
    );
    Ok(())
}
