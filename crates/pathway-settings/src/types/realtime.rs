//! Live-update channel settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::require_positive;
use crate::errors::Result;

/// Reconnect and fan-out settings for the realtime connection manager.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RealtimeSettings {
    /// Delay before the first reconnect attempt.
    pub reconnect_base_delay_ms: u64,
    /// Upper bound for the doubled reconnect delay.
    pub reconnect_max_delay_ms: u64,
    /// Attempts per disconnect before giving up (`1` = single attempt).
    pub max_reconnect_attempts: u32,
    /// Jitter factor 0.0–1.0 applied to reconnect delays.
    pub jitter_factor: f64,
    /// Capacity of the connection notice broadcast channel.
    pub notice_capacity: usize,
}

impl Default for RealtimeSettings {
    fn default() -> Self {
        Self {
            reconnect_base_delay_ms: 1_000,
            reconnect_max_delay_ms: 30_000,
            max_reconnect_attempts: 5,
            jitter_factor: 0.2,
            notice_capacity: 64,
        }
    }
}

impl RealtimeSettings {
    /// [`Self::reconnect_base_delay_ms`] as a `Duration`.
    pub fn reconnect_base_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_base_delay_ms)
    }

    /// [`Self::reconnect_max_delay_ms`] as a `Duration`.
    pub fn reconnect_max_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_max_delay_ms)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        require_positive("realtime.noticeCapacity", self.notice_capacity as u64)?;
        require_positive(
            "realtime.maxReconnectAttempts",
            u64::from(self.max_reconnect_attempts),
        )?;
        if !(0.0..=1.0).contains(&self.jitter_factor) {
            return Err(crate::SettingsError::InvalidValue(
                "realtime.jitterFactor must be within 0.0..=1.0".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let s = RealtimeSettings::default();
        assert_eq!(s.reconnect_base_delay(), Duration::from_secs(1));
        assert_eq!(s.reconnect_max_delay(), Duration::from_secs(30));
        assert_eq!(s.max_reconnect_attempts, 5);
        s.validate().unwrap();
    }

    #[test]
    fn rejects_out_of_range_jitter() {
        let s = RealtimeSettings {
            jitter_factor: 1.5,
            ..RealtimeSettings::default()
        };
        assert!(s.validate().is_err());
    }

    #[test]
    fn rejects_zero_attempts() {
        let s = RealtimeSettings {
            max_reconnect_attempts: 0,
            ..RealtimeSettings::default()
        };
        assert!(s.validate().is_err());
    }
}
