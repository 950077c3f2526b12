//! Conversation progress and chat ingestion settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::require_positive;
use crate::errors::Result;

/// Progress heuristics.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProgressSettings {
    /// Assumed number of questions in a full conversation. A UX
    /// approximation; the server does not guarantee it.
    pub estimated_total: u32,
}

impl Default for ProgressSettings {
    fn default() -> Self {
        Self {
            estimated_total: 15,
        }
    }
}

impl ProgressSettings {
    pub(crate) fn validate(&self) -> Result<()> {
        require_positive("progress.estimatedTotal", u64::from(self.estimated_total))
    }
}

/// Chat feed settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChatSettings {
    /// Poll period when messages are fetched rather than pushed.
    pub poll_interval_ms: u64,
    /// Max messages requested per poll.
    pub poll_batch_size: usize,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 3_000,
            poll_batch_size: 50,
        }
    }
}

impl ChatSettings {
    /// [`Self::poll_interval_ms`] as a `Duration`.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        require_positive("chat.pollIntervalMs", self.poll_interval_ms)?;
        require_positive("chat.pollBatchSize", self.poll_batch_size as u64)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_default_total() {
        assert_eq!(ProgressSettings::default().estimated_total, 15);
    }

    #[test]
    fn chat_defaults() {
        let s = ChatSettings::default();
        assert_eq!(s.poll_interval(), Duration::from_secs(3));
        assert_eq!(s.poll_batch_size, 50);
        s.validate().unwrap();
    }
}
