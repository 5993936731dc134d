//! Delegation between agents.
//!
//! [`DelegationEngine::delegate_work`] suspends the delegating caller until
//! the delegate calls report-out for the same conversation, the delegation
//! times out, or the conversation tree is terminated. Conversation records
//! outlive their contexts so diagnostics can inspect finished work until
//! [`DelegationEngine::cleanup`] prunes them.

mod cleanup;
mod conversation;
mod engine;
mod stats;

pub use cleanup::CleanupTask;
pub use conversation::{ConversationRecord, ConversationStatus};
pub use engine::DelegationEngine;
pub use stats::{ConversationStats, DelegationStats};
