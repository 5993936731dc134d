//! Per-agent execution context.

use serde::Serialize;

use super::ids::ConversationId;
use crate::prompts::DelegationTarget;
use crate::tools::ToolInfo;

/// Everything the backend needs to run one agent inside the delegation tree.
///
/// `delegation_chain` lists ancestors from the root down and never contains
/// `agent_name` itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentExecutionContext {
    pub agent_name: String,
    pub conversation_id: ConversationId,
    pub parent_conversation_id: Option<ConversationId>,
    pub system_prompt: String,
    pub available_tools: Vec<ToolInfo>,
    pub delegation_chain: Vec<String>,
    pub available_delegation_targets: Vec<DelegationTarget>,
}

impl AgentExecutionContext {
    pub fn is_root(&self) -> bool {
        self.parent_conversation_id.is_none()
    }

    pub fn depth(&self) -> usize {
        self.delegation_chain.len()
    }

    /// Ancestors followed by this agent.
    pub fn lineage(&self) -> impl Iterator<Item = &str> {
        self.delegation_chain
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(self.agent_name.as_str()))
    }

    /// Delegating from here to `target` would re-enter the ancestry.
    pub fn would_cycle_to(&self, target: &str) -> bool {
        self.lineage().any(|name| name == target)
    }

    pub fn has_tool(&self, tool_name: &str) -> bool {
        self.available_tools.iter().any(|t| t.name == tool_name)
    }

    pub fn can_delegate_to(&self, target: &str) -> bool {
        self.available_delegation_targets
            .iter()
            .any(|t| t.name == target)
    }

    /// Checks the fields the backend relies on.
    pub fn validate(&self) -> crate::Result<()> {
        let fail = |reason: &str| {
            Err(crate::Error::agent_execution(format!(
                "Invalid agent context: {}",
                reason
            ))
            .with_agent(self.agent_name.clone()))
        };

        if self.agent_name.trim().is_empty() {
            return fail("agent name is empty");
        }
        if self.conversation_id.is_nil() {
            return fail("conversation id is nil");
        }
        if self.system_prompt.trim().is_empty() {
            return fail("system prompt is empty");
        }
        if self.delegation_chain.iter().any(|a| a == &self.agent_name) {
            return fail("delegation chain contains the agent itself");
        }
        if self.delegation_chain.iter().any(|a| a.trim().is_empty()) {
            return fail("delegation chain contains an empty name");
        }
        Ok(())
    }
}
