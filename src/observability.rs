//! Tracing bootstrap for the worker process.

use anyhow::{Error, Result};
use once_cell::sync::OnceCell;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

static TRACING_INIT: OnceCell<()> = OnceCell::new();

/// Initialize the tracing subscriber exactly once.
///
/// `RUST_LOG` controls the filter (default `info`). Set
/// `GEOCODER_LOG_JSON=1` to emit structured JSON lines instead of the
/// human-readable format.
///
/// # Errors
/// Returns an error if subscriber initialization fails.
pub fn init() -> Result<()> {
    TRACING_INIT.get_or_try_init(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        let json = std::env::var("GEOCODER_LOG_JSON").is_ok_and(|v| v == "1" || v == "true");

        if json {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().with_target(false).json())
                .try_init()
                .map_err(|e| Error::msg(e.to_string()))?;
        } else {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().with_target(false))
                .try_init()
                .map_err(|e| Error::msg(e.to_string()))?;
        }

        Ok::<(), Error>(())
    })?;
    Ok(())
}
