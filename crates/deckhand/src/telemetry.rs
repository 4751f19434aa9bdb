//! Logging setup.
//!
//! Library code logs through both `log` and `tracing`. [`init_logging`]
//! installs a `tracing` subscriber and forwards `log` records into it, so a
//! single filter governs both.

use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter};

use crate::error::{DeckhandError, Result};

/// Installs the global subscriber.
///
/// `RUST_LOG` takes precedence over `default_filter`. With `json` set, each
/// event is written as one JSON object per line.
pub fn init_logging(default_filter: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .map_err(|e| DeckhandError::Logging(e.to_string()))?;

    let (text_layer, json_layer) = if json {
        (None, Some(fmt::layer().json().with_target(true).flatten_event(true)))
    } else {
        (Some(fmt::layer().with_target(true)), None)
    };

    let subscriber = tracing_subscriber::registry()
        .with(text_layer)
        .with(json_layer)
        .with(filter);

    tracing_log::LogTracer::init().map_err(|e| DeckhandError::Logging(e.to_string()))?;
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| DeckhandError::Logging(e.to_string()))?;

    tracing::info!(filter = %default_filter, json, "Logging initialized");
    Ok(())
}

/// Routes logs to the test harness output. Safe to call repeatedly.
pub fn init_test_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(filter)
        .try_init();
}
