//! Tool registry.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::access::{ToolCatalog, ToolInfo};
use super::context::ToolContext;
use super::delegate::DelegateWorkTool;
use super::output::ToolResult;
use super::report::ReportOutTool;
use super::traits::{Tool, ToolDefinition};
use crate::agent::AgentExecutionContext;
use crate::delegation::DelegationEngine;

/// Callable tools in registration order.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding `delegateWork` and `reportOut` bound to `engine`.
    pub fn with_delegation_tools(engine: DelegationEngine) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(DelegateWorkTool::new(engine.clone())));
        registry.register(Arc::new(ReportOutTool::new(engine)));
        registry
    }

    /// Adds `tool`, replacing any tool of the same name in place.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        match self.tools.iter_mut().find(|t| t.name() == tool.name()) {
            Some(existing) => *existing = tool,
            None => self.tools.push(tool),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.definition()).collect()
    }

    /// Definitions of the registered tools `agent` is allowed to call.
    pub fn definitions_for(&self, agent: &AgentExecutionContext) -> Vec<ToolDefinition> {
        self.tools
            .iter()
            .filter(|t| agent.has_tool(t.name()))
            .map(|t| t.definition())
            .collect()
    }

    pub fn tool_infos(&self) -> Vec<ToolInfo> {
        self.tools
            .iter()
            .map(|t| ToolInfo::new(t.name(), t.description().trim()))
            .collect()
    }

    /// Runs a tool by name. Only cancellation surfaces as `Err`.
    pub async fn execute(
        &self,
        name: &str,
        input: serde_json::Value,
        context: &ToolContext,
    ) -> crate::Result<ToolResult> {
        match self.get(name) {
            Some(tool) => {
                debug!(tool = %name, agent = %context.agent_name(), "Executing tool");
                tool.execute(input, context).await
            }
            None => Ok(ToolResult::error(format!("Unknown tool: {}", name))),
        }
    }

    /// Runs a tool on behalf of `agent`, refusing tools outside its
    /// permitted set.
    pub async fn execute_as(
        &self,
        agent: &AgentExecutionContext,
        name: &str,
        input: serde_json::Value,
        cancellation: CancellationToken,
    ) -> crate::Result<ToolResult> {
        if !agent.has_tool(name) {
            let err = crate::Error::tool_access(format!(
                "Agent '{}' is not allowed to use tool '{}'",
                agent.agent_name, name
            ))
            .with_agent(agent.agent_name.clone());
            return Ok(ToolResult::error(err.to_string()));
        }
        let context = ToolContext::for_agent(agent).with_cancellation(cancellation);
        self.execute(name, input, &context).await
    }
}

impl ToolCatalog for ToolRegistry {
    fn tools(&self) -> Vec<ToolInfo> {
        self.tool_infos()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::ConversationId;
    use crate::tools::SchemaTool;
    use async_trait::async_trait;
    use schemars::JsonSchema;
    use serde::Deserialize;

    #[derive(Deserialize, JsonSchema)]
    struct EchoInput {
        text: String,
    }

    struct EchoTool;

    #[async_trait]
    impl SchemaTool for EchoTool {
        type Input = EchoInput;
        const NAME: &'static str = "echo";
        const DESCRIPTION: &'static str = "Echoes text";

        async fn handle(&self, input: EchoInput, _context: &ToolContext) -> crate::Result<ToolResult> {
            Ok(ToolResult::success(input.text))
        }
    }

    fn agent_with(tools: &[&str]) -> AgentExecutionContext {
        AgentExecutionContext {
            agent_name: "reviewer".into(),
            conversation_id: ConversationId::new(),
            parent_conversation_id: None,
            system_prompt: "Review.".into(),
            available_tools: tools.iter().map(|t| ToolInfo::named(*t)).collect(),
            delegation_chain: Vec::new(),
            available_delegation_targets: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_execute_and_unknown_tool() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        let context = ToolContext::new("reviewer", ConversationId::new());

        let result = registry
            .execute("echo", serde_json::json!({"text": "hi"}), &context)
            .await
            .unwrap();
        assert_eq!(result.text(), "hi");

        let result = registry
            .execute("missing", serde_json::json!({}), &context)
            .await
            .unwrap();
        assert!(result.is_error());

        let result = registry
            .execute("echo", serde_json::json!({"wrong": 1}), &context)
            .await
            .unwrap();
        assert!(result.text().starts_with("Invalid input"));
    }

    #[tokio::test]
    async fn test_execute_as_enforces_permissions() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));

        let denied = registry
            .execute_as(&agent_with(&[]), "echo", serde_json::json!({"text": "hi"}), CancellationToken::new())
            .await
            .unwrap();
        assert!(denied.is_error());
        assert!(denied.text().contains("not allowed to use tool 'echo'"));

        let allowed = agent_with(&["echo"]);
        assert_eq!(registry.definitions_for(&allowed).len(), 1);
        let ok = registry
            .execute_as(&allowed, "echo", serde_json::json!({"text": "hi"}), CancellationToken::new())
            .await
            .unwrap();
        assert!(!ok.is_error());
    }

    #[tokio::test]
    async fn test_cancelled_context_is_err() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        let token = CancellationToken::new();
        token.cancel();

        let err = registry
            .execute_as(&agent_with(&["echo"]), "echo", serde_json::json!({"text": "hi"}), token)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
    }

    #[test]
    fn test_register_replaces_in_place() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        registry.register(Arc::new(EchoTool));
        assert_eq!(registry.names(), ["echo"]);
        assert_eq!(registry.tools()[0].description, "Echoes text");
    }
}
