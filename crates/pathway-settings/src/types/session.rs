//! Session heartbeat and refresh settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::require_positive;
use crate::errors::Result;

/// Settings for the session lifecycle coordinator.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionSettings {
    /// Heartbeat period.
    pub heartbeat_interval_ms: u64,
    /// Refresh when less than this much time remains.
    pub refresh_threshold_ms: u64,
    /// Emit an expiry warning when less than this much time remains.
    pub warning_threshold_ms: u64,
    /// Call the Data Service sign-out once expiry is observed.
    pub sign_out_on_expiry: bool,
    /// Capacity of the session signal broadcast channel.
    pub signal_capacity: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: 60_000,
            refresh_threshold_ms: 600_000,
            warning_threshold_ms: 300_000,
            sign_out_on_expiry: true,
            signal_capacity: 64,
        }
    }
}

impl SessionSettings {
    /// [`Self::heartbeat_interval_ms`] as a `Duration`.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// [`Self::refresh_threshold_ms`] as a `Duration`.
    pub fn refresh_threshold(&self) -> Duration {
        Duration::from_millis(self.refresh_threshold_ms)
    }

    /// [`Self::warning_threshold_ms`] as a `Duration`.
    pub fn warning_threshold(&self) -> Duration {
        Duration::from_millis(self.warning_threshold_ms)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        require_positive("session.heartbeatIntervalMs", self.heartbeat_interval_ms)?;
        require_positive("session.refreshThresholdMs", self.refresh_threshold_ms)?;
        require_positive("session.signalCapacity", self.signal_capacity as u64)?;
        Ok(())
    }
}
