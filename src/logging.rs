//! Logging setup.
//!
//! The crate logs through `tracing`; platforms that do not install their own
//! subscriber can call [`init`] once during setup.

use tracing::debug;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::config::LogConfig;
use crate::error::{Error, Result};

/// Install a global `tracing` subscriber configured by `config`.
///
/// `RUST_LOG` directives are honoured on top of the configured level.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed, or if JSON
/// output is requested without the `json-logs` feature.
pub fn init(config: &LogConfig) -> Result<()> {
    let level: tracing::Level = config.level.into();
    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if config.json {
        #[cfg(feature = "json-logs")]
        {
            let subscriber = FmtSubscriber::builder()
                .with_env_filter(filter)
                .with_span_events(FmtSpan::CLOSE)
                .with_target(true)
                .with_thread_names(true)
                .json()
                .flatten_event(true)
                .with_current_span(false)
                .finish();

            tracing::subscriber::set_global_default(subscriber).map_err(|e| {
                Error::config(format!("Failed to initialize JSON logging: {e}"))
            })?;

            debug!(level = ?config.level, "JSON logging initialized");
            return Ok(());
        }

        #[cfg(not(feature = "json-logs"))]
        {
            return Err(Error::config(
                "JSON logging requested but feature not enabled",
            ));
        }
    }

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(true)
        .with_thread_names(true)
        .with_ansi(config.color)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| Error::config(format!("Failed to initialize logging: {e}")))?;

    debug!(level = ?config.level, "Logging initialized");
    Ok(())
}
