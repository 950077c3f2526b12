//! # pathway-telemetry
//!
//! One-shot `tracing` subscriber setup driven by [`LoggingSettings`].
//! `RUST_LOG` overrides the configured filter when set.

#![deny(unsafe_code)]

use pathway_settings::LoggingSettings;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Errors from [`init_logging`].
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// The configured filter directive could not be parsed.
    #[error("invalid log filter `{directive}`: {message}")]
    InvalidFilter {
        /// Directive that failed.
        directive: String,
        /// Parser message.
        message: String,
    },
    /// A global subscriber is already installed.
    #[error("logging already initialised: {0}")]
    AlreadyInitialised(String),
}

/// Build the filter directive string from settings (`info,pathway_realtime=debug`).
pub fn filter_directive(settings: &LoggingSettings) -> String {
    let mut directive = settings.level.to_lowercase();
    for (module, level) in &settings.module_levels {
        directive.push(',');
        directive.push_str(module);
        directive.push('=');
        directive.push_str(&level.to_lowercase());
    }
    directive
}

/// Resolve the effective filter: `RUST_LOG` if set and valid, otherwise settings.
pub fn build_filter(settings: &LoggingSettings) -> Result<EnvFilter, TelemetryError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    let directive = filter_directive(settings);
    EnvFilter::try_new(&directive).map_err(|e| TelemetryError::InvalidFilter {
        directive,
        message: e.to_string(),
    })
}

/// Install the global subscriber. Call once at startup.
pub fn init_logging(settings: &LoggingSettings) -> Result<(), TelemetryError> {
    let filter = build_filter(settings)?;

    let json_layer = settings.json.then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_span_list(true)
    });
    let text_layer = (!settings.json).then(|| tracing_subscriber::fmt::layer().with_target(true));

    let directive = filter.to_string();
    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(text_layer)
        .try_init()
        .map_err(|e| TelemetryError::AlreadyInitialised(e.to_string()))?;

    tracing::debug!(filter = %directive, json = settings.json, "logging initialised");
    Ok(())
}
