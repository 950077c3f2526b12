//! Client bootstrap errors.

use pathway_settings::SettingsError;
use pathway_telemetry::TelemetryError;

/// Failures while bootstrapping the client core.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Settings could not be loaded.
    #[error(transparent)]
    Settings(#[from] SettingsError),

    /// Logging could not be installed.
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),
}

impl ClientError {
    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Settings(_) => "settings",
            Self::Telemetry(_) => "telemetry",
        }
    }
}
