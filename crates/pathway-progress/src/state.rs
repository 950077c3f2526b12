//! Derived progress snapshot.

use std::collections::BTreeMap;

use pathway_core::SessionId;
use serde::Serialize;

/// Category reported once the recommendation arrives.
pub const COMPLETE_CATEGORY: &str = "complete";

/// Progress of one chat session.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressState {
    /// Session the counts belong to.
    pub session_id: Option<SessionId>,
    /// Category of the latest bot question, or [`COMPLETE_CATEGORY`].
    pub current_category: Option<String>,
    /// Bot questions seen per category.
    pub per_category_counts: BTreeMap<String, u32>,
    /// 0..=100, never decreasing within a session.
    pub overall_percent: u8,
    /// Set by the recommendation; never cleared within a session.
    pub is_complete: bool,
}

impl ProgressState {
    /// Fresh state for `session_id`.
    pub fn for_session(session_id: SessionId) -> Self {
        Self {
            session_id: Some(session_id),
            ..Self::default()
        }
    }

    /// Total categorised bot questions.
    pub fn answered(&self) -> u32 {
        self.per_category_counts.values().sum()
    }

    /// Count for one category.
    pub fn count(&self, category: &str) -> u32 {
        self.per_category_counts.get(category).copied().unwrap_or(0)
    }
}
