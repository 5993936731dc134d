//! Aggregate counts for diagnostics.

use serde::Serialize;

use super::conversation::{ConversationRecord, ConversationStatus};
use crate::observability::MetricsSnapshot;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationStats {
    pub total: usize,
    /// Conversations still pending.
    pub active: usize,
    pub completed: usize,
    pub failed: usize,
}

impl ConversationStats {
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a ConversationRecord>) -> Self {
        records
            .into_iter()
            .fold(Self::default(), |mut stats, record| {
                stats.total += 1;
                match record.status {
                    ConversationStatus::Pending => stats.active += 1,
                    ConversationStatus::Completed => stats.completed += 1,
                    ConversationStatus::Failed => stats.failed += 1,
                }
                stats
            })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DelegationStats {
    /// Callers currently suspended in a delegation.
    pub pending_delegations: usize,
    pub active_contexts: usize,
    pub active_agents: Vec<String>,
    pub conversations: ConversationStats,
    pub metrics: MetricsSnapshot,
}
