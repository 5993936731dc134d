//! Execution context for tool operations.

use tokio_util::sync::CancellationToken;

use crate::agent::{AgentExecutionContext, ConversationId};

/// Identity of the calling agent plus the host's cancellation signal.
#[derive(Clone, Debug)]
pub struct ToolContext {
    agent_name: String,
    conversation_id: ConversationId,
    cancellation: CancellationToken,
}

impl ToolContext {
    pub fn new(agent_name: impl Into<String>, conversation_id: ConversationId) -> Self {
        Self {
            agent_name: agent_name.into(),
            conversation_id,
            cancellation: CancellationToken::new(),
        }
    }

    pub fn for_agent(context: &AgentExecutionContext) -> Self {
        Self::new(context.agent_name.clone(), context.conversation_id)
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn agent_name(&self) -> &str {
        &self.agent_name
    }

    pub fn conversation_id(&self) -> ConversationId {
        self.conversation_id
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}
