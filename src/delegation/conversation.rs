//! Conversation records and their pending correlations.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::oneshot;

use crate::agent::ConversationId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStatus {
    Pending,
    Completed,
    Failed,
}

impl ConversationStatus {
    pub fn is_pending(self) -> bool {
        self == Self::Pending
    }
}

impl std::fmt::Display for ConversationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
        })
    }
}

/// Snapshot of one delegated conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationRecord {
    pub conversation_id: ConversationId,
    pub agent_name: String,
    pub parent_conversation_id: Option<ConversationId>,
    pub parent_agent: String,
    pub status: ConversationStatus,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    /// Why the conversation failed, when it did.
    pub failure: Option<String>,
}

pub(crate) type Correlation = oneshot::Sender<crate::Result<String>>;

pub(crate) struct ConversationEntry {
    pub(crate) record: ConversationRecord,
    correlation: Option<Correlation>,
    pub(crate) seq: u64,
}

impl ConversationEntry {
    /// Leaves `pending` exactly once and hands `outcome` to the waiting
    /// caller. Returns false when the conversation had already settled.
    pub(crate) fn settle(&mut self, outcome: crate::Result<String>) -> bool {
        if !self.record.status.is_pending() {
            return false;
        }

        let now = Utc::now();
        self.record.last_activity = now;
        match &outcome {
            Ok(_) => self.record.status = ConversationStatus::Completed,
            Err(e) => {
                self.record.status = ConversationStatus::Failed;
                self.record.failure = Some(e.to_string());
            }
        }

        if let Some(tx) = self.correlation.take() {
            // Receiver gone means the caller already resumed.
            let _ = tx.send(outcome);
        }
        true
    }
}

/// Every conversation the engine knows about.
#[derive(Default)]
pub(crate) struct ConversationTable {
    entries: HashMap<ConversationId, ConversationEntry>,
    next_seq: u64,
}

impl ConversationTable {
    pub(crate) fn open(&mut self, record: ConversationRecord, correlation: Correlation) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.insert(
            record.conversation_id,
            ConversationEntry {
                record,
                correlation: Some(correlation),
                seq,
            },
        );
    }

    pub(crate) fn get(&self, id: &ConversationId) -> Option<&ConversationEntry> {
        self.entries.get(id)
    }

    pub(crate) fn get_mut(&mut self, id: &ConversationId) -> Option<&mut ConversationEntry> {
        self.entries.get_mut(id)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn entries(&self) -> impl Iterator<Item = &ConversationEntry> {
        self.entries.values()
    }

    /// Records in creation order.
    pub(crate) fn records_where(
        &self,
        mut keep: impl FnMut(&ConversationRecord) -> bool,
    ) -> Vec<ConversationRecord> {
        let mut matching: Vec<&ConversationEntry> =
            self.entries.values().filter(|e| keep(&e.record)).collect();
        matching.sort_by_key(|e| e.seq);
        matching.into_iter().map(|e| e.record.clone()).collect()
    }

    /// Most recently created pending conversation of `agent_name`.
    pub(crate) fn latest_pending(&self, agent_name: &str) -> Option<ConversationId> {
        self.entries
            .values()
            .filter(|e| e.record.agent_name == agent_name && e.record.status.is_pending())
            .max_by_key(|e| e.seq)
            .map(|e| e.record.conversation_id)
    }

    /// `root` followed by every descendant, breadth first. `root` need not
    /// have a record of its own.
    pub(crate) fn subtree(&self, root: ConversationId) -> Vec<ConversationId> {
        let mut ids = vec![root];
        let mut seen: HashSet<ConversationId> = HashSet::from([root]);
        let mut cursor = 0;
        while cursor < ids.len() {
            let parent = ids[cursor];
            cursor += 1;
            let mut children: Vec<&ConversationEntry> = self
                .entries
                .values()
                .filter(|e| e.record.parent_conversation_id == Some(parent))
                .collect();
            children.sort_by_key(|e| e.seq);
            for child in children {
                if seen.insert(child.record.conversation_id) {
                    ids.push(child.record.conversation_id);
                }
            }
        }
        ids
    }

    /// Removes records idle since before `cutoff`, returning them.
    pub(crate) fn prune(&mut self, cutoff: DateTime<Utc>) -> Vec<ConversationEntry> {
        let stale: Vec<ConversationId> = self
            .entries
            .values()
            .filter(|e| e.record.last_activity < cutoff)
            .map(|e| e.record.conversation_id)
            .collect();
        stale
            .iter()
            .filter_map(|id| self.entries.remove(id))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(agent: &str, parent: Option<ConversationId>) -> ConversationRecord {
        let now = Utc::now();
        ConversationRecord {
            conversation_id: ConversationId::new(),
            agent_name: agent.into(),
            parent_conversation_id: parent,
            parent_agent: "coordinator".into(),
            status: ConversationStatus::Pending,
            created_at: now,
            last_activity: now,
            failure: None,
        }
    }

    #[test]
    fn test_settle_first_wins() {
        let mut table = ConversationTable::default();
        let rec = record("reviewer", None);
        let id = rec.conversation_id;
        let (tx, mut rx) = oneshot::channel();
        table.open(rec, tx);

        let entry = table.get_mut(&id).unwrap();
        assert!(entry.settle(Ok("done".into())));
        assert!(!entry.settle(Err(crate::Error::Cancelled)));
        assert_eq!(entry.record.status, ConversationStatus::Completed);
        assert_eq!(rx.try_recv().unwrap().unwrap(), "done");
    }

    #[test]
    fn test_settle_failure_records_reason() {
        let mut table = ConversationTable::default();
        let rec = record("reviewer", None);
        let id = rec.conversation_id;
        let (tx, rx) = oneshot::channel();
        drop(rx);
        table.open(rec, tx);

        let entry = table.get_mut(&id).unwrap();
        assert!(entry.settle(Err(crate::Error::delegation("boom"))));
        assert_eq!(entry.record.status, ConversationStatus::Failed);
        assert!(entry.record.failure.as_deref().unwrap().contains("boom"));
    }

    #[test]
    fn test_latest_pending_and_subtree() {
        let mut table = ConversationTable::default();
        let root = ConversationId::new();
        let first = record("reviewer", Some(root));
        let second = record("reviewer", Some(root));
        let grandchild = record("tester", Some(second.conversation_id));
        let (first_id, second_id, grandchild_id) = (
            first.conversation_id,
            second.conversation_id,
            grandchild.conversation_id,
        );
        for rec in [first, second, grandchild] {
            table.open(rec, oneshot::channel().0);
        }

        assert_eq!(table.latest_pending("reviewer"), Some(second_id));
        table.get_mut(&second_id).unwrap().settle(Ok(String::new()));
        assert_eq!(table.latest_pending("reviewer"), Some(first_id));

        assert_eq!(table.subtree(root), vec![root, first_id, second_id, grandchild_id]);
        assert_eq!(table.subtree(second_id), vec![second_id, grandchild_id]);
    }

    #[test]
    fn test_prune_by_last_activity() {
        let mut table = ConversationTable::default();
        let mut old = record("reviewer", None);
        old.last_activity = Utc::now() - chrono::Duration::hours(1);
        let fresh = record("tester", None);
        let fresh_id = fresh.conversation_id;
        table.open(old, oneshot::channel().0);
        table.open(fresh, oneshot::channel().0);

        let pruned = table.prune(Utc::now() - chrono::Duration::minutes(30));
        assert_eq!(pruned.len(), 1);
        assert_eq!(table.len(), 1);
        assert!(table.get(&fresh_id).is_some());
    }
}
