//! Agent context lifecycle: creation, lookup, refresh and cascading termination.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock as StdRwLock};

use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::backend::AgentBackend;
use super::context::AgentExecutionContext;
use super::ids::ConversationId;
use crate::config::{AgentDefinition, AgentsConfig, is_valid_identifier};
use crate::observability::ErrorReporter;
use crate::prompts::{build_system_prompt, get_delegation_targets};
use crate::tools::{ToolCatalog, ToolInfo, ToolResolver};

#[derive(Default)]
struct ContextIndex {
    by_conversation: HashMap<ConversationId, AgentExecutionContext>,
    /// Conversation ids per agent, oldest first.
    by_name: HashMap<String, Vec<ConversationId>>,
}

impl ContextIndex {
    fn insert(&mut self, context: AgentExecutionContext) {
        self.by_name
            .entry(context.agent_name.clone())
            .or_default()
            .push(context.conversation_id);
        self.by_conversation.insert(context.conversation_id, context);
    }

    fn latest(&self, name: &str) -> Option<&AgentExecutionContext> {
        self.by_name
            .get(name)
            .and_then(|ids| ids.last())
            .and_then(|id| self.by_conversation.get(id))
    }

    /// Removes `roots` and every context whose parent chain leads back to one
    /// of them. Returns the removed ids, roots first.
    fn remove_subtree(&mut self, roots: &[ConversationId]) -> Vec<ConversationId> {
        let mut doomed: Vec<ConversationId> = roots
            .iter()
            .filter(|id| self.by_conversation.contains_key(id))
            .copied()
            .collect();
        let mut seen: HashSet<ConversationId> = doomed.iter().copied().collect();

        let mut cursor = 0;
        while cursor < doomed.len() {
            let parent = doomed[cursor];
            cursor += 1;
            for (id, ctx) in &self.by_conversation {
                if ctx.parent_conversation_id == Some(parent) && seen.insert(*id) {
                    doomed.push(*id);
                }
            }
        }

        for id in &doomed {
            if let Some(ctx) = self.by_conversation.remove(id)
                && let Some(ids) = self.by_name.get_mut(&ctx.agent_name)
            {
                ids.retain(|c| c != id);
                if ids.is_empty() {
                    self.by_name.remove(&ctx.agent_name);
                }
            }
        }
        doomed
    }
}

/// Owns every live [`AgentExecutionContext`], indexed by agent name and by
/// conversation id.
///
/// Each context moves absent → active → terminated. Termination is terminal
/// and idempotent.
pub struct AgentContextManager {
    contexts: RwLock<ContextIndex>,
    config: StdRwLock<Option<Arc<AgentsConfig>>>,
    tool_resolver: ToolResolver,
    backend: Option<Arc<dyn AgentBackend>>,
    reporter: Arc<ErrorReporter>,
}

impl AgentContextManager {
    pub fn new(catalog: Arc<dyn ToolCatalog>, reporter: Arc<ErrorReporter>) -> Self {
        Self {
            contexts: RwLock::new(ContextIndex::default()),
            config: StdRwLock::new(None),
            tool_resolver: ToolResolver::new(catalog),
            backend: None,
            reporter,
        }
    }

    pub fn with_backend(mut self, backend: Arc<dyn AgentBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn with_configuration(self, config: Arc<AgentsConfig>) -> Self {
        self.set_configuration(config);
        self
    }

    /// Replaces the configuration wholesale. Live contexts keep what they
    /// were created with until [`Self::update_agent_tools`] refreshes them.
    pub fn set_configuration(&self, config: Arc<AgentsConfig>) {
        debug!(agents = config.agents().len(), entry = %config.entry_agent(), "Configuration installed");
        *self.config.write().unwrap_or_else(|e| e.into_inner()) = Some(config);
    }

    pub fn configuration(&self) -> Option<Arc<AgentsConfig>> {
        self.config.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn has_backend(&self) -> bool {
        self.backend.is_some()
    }

    pub fn tool_resolver(&self) -> &ToolResolver {
        &self.tool_resolver
    }

    pub fn reporter(&self) -> &Arc<ErrorReporter> {
        &self.reporter
    }

    /// Creates a root context for `definition`.
    ///
    /// With `config`, the system prompt gains the delegation section and the
    /// tool list is resolved; without it the context carries the bare prompt
    /// and no tools.
    pub async fn initialize_agent(
        &self,
        definition: &AgentDefinition,
        config: Option<&AgentsConfig>,
    ) -> crate::Result<AgentExecutionContext> {
        let context = self
            .build_context(definition, config, None)
            .inspect_err(|e| self.reporter.report(e))?;
        debug!(
            agent = %context.agent_name,
            conversation_id = %context.conversation_id,
            tools = context.available_tools.len(),
            "Agent context initialized"
        );
        self.contexts.write().await.insert(context.clone());
        Ok(context)
    }

    /// Creates the entry agent's root context from the installed configuration.
    pub async fn initialize_entry_agent(&self) -> crate::Result<AgentExecutionContext> {
        let config = self.require_configuration()?;
        let definition = config.entry_definition().ok_or_else(|| {
            crate::Error::configuration(format!(
                "Entry agent '{}' not found in configuration",
                config.entry_agent()
            ))
        })?;
        self.initialize_agent(definition, Some(&config)).await
    }

    /// Creates a context for `definition` running on behalf of `parent`.
    ///
    /// Fails with a circular-delegation error when `definition.name` already
    /// appears in the parent's lineage.
    pub async fn initialize_child_agent(
        &self,
        definition: &AgentDefinition,
        parent: &AgentExecutionContext,
        config: Option<&AgentsConfig>,
    ) -> crate::Result<AgentExecutionContext> {
        if parent.would_cycle_to(&definition.name) {
            let mut chain: Vec<String> = parent.lineage().map(str::to_string).collect();
            chain.push(definition.name.clone());
            let err = crate::Error::circular(
                format!(
                    "Agent '{}' is already part of the delegation chain: {}",
                    definition.name,
                    chain.join(" -> ")
                ),
                chain,
            )
            .with_agent(definition.name.clone());
            self.reporter.report(&err);
            return Err(err);
        }

        let context = self
            .build_context(definition, config, Some(parent))
            .inspect_err(|e| self.reporter.report(e))?;
        debug!(
            agent = %context.agent_name,
            parent = %parent.agent_name,
            conversation_id = %context.conversation_id,
            depth = context.depth(),
            "Child agent context initialized"
        );
        self.contexts.write().await.insert(context.clone());
        Ok(context)
    }

    fn build_context(
        &self,
        definition: &AgentDefinition,
        config: Option<&AgentsConfig>,
        parent: Option<&AgentExecutionContext>,
    ) -> crate::Result<AgentExecutionContext> {
        let invalid = |reason: &str| {
            crate::Error::agent_execution(format!("Invalid agent definition: {}", reason))
                .with_agent(definition.name.clone())
        };
        if definition.name.trim().is_empty() {
            return Err(invalid("name is empty"));
        }
        if !is_valid_identifier(&definition.name) {
            return Err(invalid("name must match [A-Za-z0-9_-]{1,50}"));
        }
        if definition.system_prompt.trim().is_empty() {
            return Err(invalid("system prompt is empty"));
        }

        let (system_prompt, available_tools, available_delegation_targets) = match config {
            Some(config) => {
                let tools = self
                    .tool_resolver
                    .get_available_tools(&definition.name, config)
                    .map_err(|e| {
                        crate::Error::agent_execution(format!(
                            "Failed to resolve tools for agent '{}': {}",
                            definition.name,
                            e.message()
                        ))
                        .with_agent(definition.name.clone())
                    })?;
                (
                    build_system_prompt(&definition.system_prompt, &definition.name, config),
                    tools,
                    get_delegation_targets(&definition.name, config),
                )
            }
            None => (definition.system_prompt.clone(), Vec::new(), Vec::new()),
        };

        let (parent_conversation_id, delegation_chain) = match parent {
            Some(parent) => (
                Some(parent.conversation_id),
                parent.lineage().map(str::to_string).collect(),
            ),
            None => (None, Vec::new()),
        };

        Ok(AgentExecutionContext {
            agent_name: definition.name.clone(),
            conversation_id: ConversationId::new(),
            parent_conversation_id,
            system_prompt,
            available_tools,
            delegation_chain,
            available_delegation_targets,
        })
    }

    /// True when `to` already appears in the lineage of `from`'s most recent
    /// context. Always true for `from == to`.
    pub async fn would_create_circular_delegation(&self, from: &str, to: &str) -> bool {
        if from == to {
            return true;
        }
        self.contexts
            .read()
            .await
            .latest(from)
            .is_some_and(|ctx| ctx.would_cycle_to(to))
    }

    /// Runs `context` on the backend after checking it is well formed.
    pub async fn execute_agent(
        &self,
        context: &AgentExecutionContext,
        input: &str,
    ) -> crate::Result<String> {
        context
            .validate()
            .inspect_err(|e| self.reporter.report(e))?;

        let Some(backend) = &self.backend else {
            let err = crate::Error::agent_execution("No agent backend configured")
                .with_agent(context.agent_name.clone());
            self.reporter.report(&err);
            return Err(err);
        };

        debug!(agent = %context.agent_name, conversation_id = %context.conversation_id, "Executing agent");
        backend
            .execute(context, input)
            .await
            .inspect_err(|e| self.reporter.report(e))
    }

    /// Terminates every context of `name` and their descendants. Terminating
    /// an agent with no live context does nothing.
    pub async fn terminate_agent(&self, name: &str) -> Vec<ConversationId> {
        let mut index = self.contexts.write().await;
        let roots = index.by_name.get(name).cloned().unwrap_or_default();
        let removed = index.remove_subtree(&roots);
        drop(index);

        if !removed.is_empty() {
            debug!(agent = %name, removed = removed.len(), "Agent terminated");
        }
        removed
    }

    /// Terminates one context and its descendants.
    pub async fn terminate_agent_by_conversation(
        &self,
        conversation_id: ConversationId,
    ) -> Vec<ConversationId> {
        let removed = self
            .contexts
            .write()
            .await
            .remove_subtree(&[conversation_id]);
        if !removed.is_empty() {
            debug!(conversation_id = %conversation_id, removed = removed.len(), "Conversation contexts terminated");
        }
        removed
    }

    /// Drops every live context. Returns how many were removed.
    pub async fn terminate_all(&self) -> usize {
        let mut index = self.contexts.write().await;
        let removed = index.by_conversation.len();
        *index = ContextIndex::default();
        drop(index);

        if removed > 0 {
            debug!(removed, "All agent contexts terminated");
        }
        removed
    }

    /// Most recently created live context for `name`.
    pub async fn get_agent_context(&self, name: &str) -> Option<AgentExecutionContext> {
        self.contexts.read().await.latest(name).cloned()
    }

    pub async fn get_agent_context_by_conversation(
        &self,
        conversation_id: ConversationId,
    ) -> Option<AgentExecutionContext> {
        self.contexts
            .read()
            .await
            .by_conversation
            .get(&conversation_id)
            .cloned()
    }

    /// Names with at least one live context, sorted.
    pub async fn get_active_agents(&self) -> Vec<String> {
        let mut names: Vec<String> = self.contexts.read().await.by_name.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn get_delegation_chain(&self, name: &str) -> Option<Vec<String>> {
        self.contexts
            .read()
            .await
            .latest(name)
            .map(|ctx| ctx.delegation_chain.clone())
    }

    pub async fn active_count(&self) -> usize {
        self.contexts.read().await.by_conversation.len()
    }

    /// Re-resolves the tool list of every live context of `name` against the
    /// current configuration and catalog.
    pub async fn update_agent_tools(&self, name: &str) -> crate::Result<Vec<ToolInfo>> {
        let config = self.require_configuration()?;
        let tools = self
            .tool_resolver
            .get_available_tools(name, &config)
            .inspect_err(|e| self.reporter.report(e))?;

        let mut index = self.contexts.write().await;
        let ids = index.by_name.get(name).cloned().unwrap_or_default();
        if ids.is_empty() {
            warn!(agent = %name, "Tool refresh requested for agent without a live context");
        }
        for id in ids {
            if let Some(ctx) = index.by_conversation.get_mut(&id) {
                ctx.available_tools = tools.clone();
            }
        }
        Ok(tools)
    }

    fn require_configuration(&self) -> crate::Result<Arc<AgentsConfig>> {
        self.configuration()
            .ok_or_else(|| crate::Error::configuration("No agent configuration installed"))
    }
}

impl std::fmt::Debug for AgentContextManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentContextManager")
            .field("tool_resolver", &self.tool_resolver)
            .field("has_backend", &self.backend.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DelegationPermission, ToolPermission};
    use crate::tools::StaticToolCatalog;
    use async_trait::async_trait;

    fn agent(name: &str) -> AgentDefinition {
        AgentDefinition::new(name, format!("You are {name}."))
            .with_description(name)
            .with_use_for(format!("{name} work"))
    }

    fn config() -> Arc<AgentsConfig> {
        Arc::new(
            AgentsConfig::new(
                "coordinator",
                vec![
                    agent("coordinator").with_delegation(DelegationPermission::all()),
                    agent("a").with_delegation(DelegationPermission::all()),
                    agent("b").with_delegation(DelegationPermission::all()),
                    agent("c").with_tools(ToolPermission::specific(["reportOut"])),
                ],
            )
            .unwrap(),
        )
    }

    fn manager() -> AgentContextManager {
        let catalog = Arc::new(StaticToolCatalog::from_names([
            "delegateWork",
            "reportOut",
        ]));
        AgentContextManager::new(catalog, ErrorReporter::shared(10)).with_configuration(config())
    }

    async fn chain(m: &AgentContextManager) -> Vec<AgentExecutionContext> {
        let cfg = m.configuration().unwrap();
        let root = m.initialize_entry_agent().await.unwrap();
        let a = m
            .initialize_child_agent(cfg.agent("a").unwrap(), &root, Some(&cfg))
            .await
            .unwrap();
        let b = m
            .initialize_child_agent(cfg.agent("b").unwrap(), &a, Some(&cfg))
            .await
            .unwrap();
        let c = m
            .initialize_child_agent(cfg.agent("c").unwrap(), &b, Some(&cfg))
            .await
            .unwrap();
        vec![root, a, b, c]
    }

    #[tokio::test]
    async fn test_initialize_agent_with_config() {
        let m = manager();
        let cfg = m.configuration().unwrap();
        let ctx = m.initialize_agent(cfg.agent("coordinator").unwrap(), Some(&cfg)).await.unwrap();

        assert!(ctx.is_root());
        assert!(ctx.delegation_chain.is_empty());
        assert!(ctx.system_prompt.contains("## Available Agents for Delegation"));
        assert_eq!(ctx.available_delegation_targets.len(), 3);
        assert_eq!(ctx.available_tools.len(), 2);

        let c = m.initialize_agent(cfg.agent("c").unwrap(), Some(&cfg)).await.unwrap();
        assert_eq!(c.available_tools, vec![ToolInfo::named("reportOut")]);
        assert_eq!(c.system_prompt, "You are c.");
    }

    #[tokio::test]
    async fn test_initialize_agent_without_config() {
        let m = manager();
        let ctx = m.initialize_agent(&agent("solo"), None).await.unwrap();
        assert_eq!(ctx.system_prompt, "You are solo.");
        assert!(ctx.available_tools.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_definition_rejected() {
        let m = manager();
        let err = m
            .initialize_agent(&AgentDefinition::new("", "prompt"), None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::AgentExecution);

        let cfg = m.configuration().unwrap();
        let err = m.initialize_agent(&agent("ghost"), Some(&cfg)).await.unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::AgentExecution);
        assert!(err.message().contains("Failed to resolve tools"));
    }

    #[tokio::test]
    async fn test_chain_accumulates() {
        let m = manager();
        let contexts = chain(&m).await;
        let c = &contexts[3];
        assert_eq!(c.delegation_chain, ["coordinator", "a", "b"]);
        assert_eq!(c.parent_conversation_id, Some(contexts[2].conversation_id));
        assert_eq!(m.get_delegation_chain("c").await.unwrap(), ["coordinator", "a", "b"]);
    }

    #[tokio::test]
    async fn test_runtime_cycle_rejected() {
        let m = manager();
        let contexts = chain(&m).await;
        let cfg = m.configuration().unwrap();

        let err = m
            .initialize_child_agent(cfg.agent("a").unwrap(), &contexts[3], Some(&cfg))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::CircularDelegation);
        assert_eq!(err.chain().unwrap(), ["coordinator", "a", "b", "c", "a"]);

        assert!(m.would_create_circular_delegation("c", "a").await);
        assert!(m.would_create_circular_delegation("x", "x").await);
        assert!(!m.would_create_circular_delegation("a", "c").await);
    }

    #[tokio::test]
    async fn test_terminate_cascades_and_is_idempotent() {
        let m = manager();
        let contexts = chain(&m).await;
        assert_eq!(m.active_count().await, 4);

        let removed = m.terminate_agent("a").await;
        assert_eq!(removed.len(), 3);
        assert_eq!(m.get_active_agents().await, ["coordinator"]);
        assert!(m.get_agent_context_by_conversation(contexts[3].conversation_id).await.is_none());

        assert!(m.terminate_agent("a").await.is_empty());
        assert!(m.terminate_agent_by_conversation(contexts[1].conversation_id).await.is_empty());
        assert_eq!(m.active_count().await, 1);
    }

    #[tokio::test]
    async fn test_terminate_all() {
        let m = manager();
        chain(&m).await;
        m.initialize_entry_agent().await.unwrap();

        assert_eq!(m.terminate_all().await, 5);
        assert!(m.get_active_agents().await.is_empty());
        assert!(m.get_agent_context("coordinator").await.is_none());
        assert_eq!(m.terminate_all().await, 0);
    }

    #[tokio::test]
    async fn test_latest_context_wins() {
        let m = manager();
        let cfg = m.configuration().unwrap();
        let first = m.initialize_agent(cfg.agent("c").unwrap(), Some(&cfg)).await.unwrap();
        let second = m.initialize_agent(cfg.agent("c").unwrap(), Some(&cfg)).await.unwrap();
        assert_ne!(first.conversation_id, second.conversation_id);
        assert_eq!(
            m.get_agent_context("c").await.unwrap().conversation_id,
            second.conversation_id
        );

        m.terminate_agent_by_conversation(second.conversation_id).await;
        assert_eq!(
            m.get_agent_context("c").await.unwrap().conversation_id,
            first.conversation_id
        );
    }

    #[tokio::test]
    async fn test_update_agent_tools() {
        let catalog = Arc::new(StaticToolCatalog::from_names(["reportOut"]));
        let m = AgentContextManager::new(catalog.clone(), ErrorReporter::shared(10))
            .with_configuration(config());
        m.initialize_entry_agent().await.unwrap();

        catalog.add(ToolInfo::named("delegateWork"));
        let tools = m.update_agent_tools("coordinator").await.unwrap();
        assert_eq!(tools.len(), 2);
        assert_eq!(m.get_agent_context("coordinator").await.unwrap().available_tools.len(), 2);

        assert!(m.update_agent_tools("ghost").await.is_err());
    }

    struct Echo;

    #[async_trait]
    impl AgentBackend for Echo {
        async fn execute(&self, context: &AgentExecutionContext, input: &str) -> crate::Result<String> {
            Ok(format!("{}: {}", context.agent_name, input))
        }
    }

    #[tokio::test]
    async fn test_execute_agent() {
        let m = manager();
        let ctx = m.initialize_entry_agent().await.unwrap();
        let err = m.execute_agent(&ctx, "hi").await.unwrap_err();
        assert!(err.message().contains("No agent backend"));
        assert_eq!(m.reporter().len(), 1);

        let m = manager().with_backend(Arc::new(Echo));
        let ctx = m.initialize_entry_agent().await.unwrap();
        assert_eq!(m.execute_agent(&ctx, "hi").await.unwrap(), "coordinator: hi");

        let mut broken = ctx.clone();
        broken.system_prompt.clear();
        assert!(m.execute_agent(&broken, "hi").await.is_err());
    }
}
