//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]`, so a partial
//! JSON file only needs the keys it overrides. Durations are milliseconds.

mod conversation;
mod realtime;
mod session;

pub use conversation::*;
pub use realtime::*;
pub use session::*;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings type.
///
/// ```json
/// {
///   "session": { "refreshThresholdMs": 300000 },
///   "progress": { "estimatedTotal": 20 }
/// }
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PathwaySettings {
    /// Settings schema version.
    pub version: String,
    /// Live-update channel settings.
    pub realtime: RealtimeSettings,
    /// Session heartbeat and refresh settings.
    pub session: SessionSettings,
    /// Conversation progress heuristics.
    pub progress: ProgressSettings,
    /// Chat ingestion settings.
    pub chat: ChatSettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
}

impl Default for PathwaySettings {
    fn default() -> Self {
        Self {
            version: "0.1.0".to_string(),
            realtime: RealtimeSettings::default(),
            session: SessionSettings::default(),
            progress: ProgressSettings::default(),
            chat: ChatSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl PathwaySettings {
    /// Reject values the components cannot run with.
    pub fn validate(&self) -> Result<()> {
        self.realtime.validate()?;
        self.session.validate()?;
        self.progress.validate()?;
        self.chat.validate()?;
        Ok(())
    }
}

/// Logging configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default level (`trace`..`error`). `RUST_LOG` wins when set.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
    /// Per-module level overrides, e.g. `{"pathway_realtime": "debug"}`.
    pub module_levels: std::collections::BTreeMap<String, String>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            module_levels: std::collections::BTreeMap::new(),
        }
    }
}

pub(crate) fn require_positive(name: &str, value: u64) -> Result<()> {
    if value == 0 {
        return Err(SettingsError::InvalidValue(format!("{name} must be > 0")));
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
