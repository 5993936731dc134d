//! Text-generation backend boundary.

use async_trait::async_trait;

use super::context::AgentExecutionContext;

/// Runs one agent turn: "execute this agent with this input, get text back".
///
/// Implementations own model selection and tool-call plumbing; the agent's
/// tool calls (including `delegateWork` / `reportOut`) reach this crate
/// through [`crate::tools::ToolRegistry`].
#[async_trait]
pub trait AgentBackend: Send + Sync {
    async fn execute(&self, context: &AgentExecutionContext, input: &str) -> crate::Result<String>;
}
