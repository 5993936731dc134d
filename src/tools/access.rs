//! Tool access control: resolving an agent's tool permission against the
//! host's live tool catalog.

use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use crate::config::{AgentsConfig, ToolPermission};

/// A callable tool as advertised by the host.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

impl ToolInfo {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self::new(name, "")
    }
}

/// Host-provided tool catalog. Read on every resolution, never cached, so
/// catalog changes between calls are always observed.
pub trait ToolCatalog: Send + Sync {
    fn tools(&self) -> Vec<ToolInfo>;
}

/// Mutable in-process catalog for hosts that push their tool list.
#[derive(Debug, Default)]
pub struct StaticToolCatalog {
    tools: RwLock<Vec<ToolInfo>>,
}

impl StaticToolCatalog {
    pub fn new(tools: Vec<ToolInfo>) -> Self {
        Self {
            tools: RwLock::new(tools),
        }
    }

    pub fn from_names(names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self::new(names.into_iter().map(ToolInfo::named).collect())
    }

    pub fn set_tools(&self, tools: Vec<ToolInfo>) {
        *self.tools.write().unwrap_or_else(|e| e.into_inner()) = tools;
    }

    pub fn add(&self, tool: ToolInfo) {
        let mut tools = self.tools.write().unwrap_or_else(|e| e.into_inner());
        if !tools.iter().any(|t| t.name == tool.name) {
            tools.push(tool);
        }
    }

    pub fn remove(&self, name: &str) -> bool {
        let mut tools = self.tools.write().unwrap_or_else(|e| e.into_inner());
        let before = tools.len();
        tools.retain(|t| t.name != name);
        tools.len() != before
    }
}

impl ToolCatalog for StaticToolCatalog {
    fn tools(&self) -> Vec<ToolInfo> {
        self.tools.read().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

/// Applies a tool permission to a catalog, preserving catalog order.
pub fn filter_tools(tools: &[ToolInfo], permission: &ToolPermission) -> Vec<ToolInfo> {
    match permission {
        ToolPermission::All => tools.to_vec(),
        ToolPermission::None => Vec::new(),
        ToolPermission::Specific { tools: allowed } => tools
            .iter()
            .filter(|t| allowed.iter().any(|a| a == &t.name))
            .cloned()
            .collect(),
    }
}

#[derive(Clone)]
pub struct ToolResolver {
    catalog: Arc<dyn ToolCatalog>,
}

impl ToolResolver {
    pub fn new(catalog: Arc<dyn ToolCatalog>) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &Arc<dyn ToolCatalog> {
        &self.catalog
    }

    /// Tools `agent_name` may call right now.
    ///
    /// An agent absent from `config` is a lookup failure, not an empty list.
    pub fn get_available_tools(
        &self,
        agent_name: &str,
        config: &AgentsConfig,
    ) -> crate::Result<Vec<ToolInfo>> {
        let definition = config.agent(agent_name).ok_or_else(|| {
            crate::Error::tool_access(format!(
                "Agent '{}' not found in configuration",
                agent_name
            ))
            .with_agent(agent_name)
        })?;
        Ok(filter_tools(
            &self.catalog.tools(),
            &definition.tool_permissions,
        ))
    }

    pub fn is_tool_allowed(
        &self,
        agent_name: &str,
        tool_name: &str,
        config: &AgentsConfig,
    ) -> crate::Result<bool> {
        Ok(self
            .get_available_tools(agent_name, config)?
            .iter()
            .any(|t| t.name == tool_name))
    }
}

impl std::fmt::Debug for ToolResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolResolver")
            .field("tools", &self.catalog.tools().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AgentDefinition;

    fn catalog() -> Vec<ToolInfo> {
        ["Read", "Write", "reportOut", "delegateWork"]
            .into_iter()
            .map(ToolInfo::named)
            .collect()
    }

    fn names(tools: &[ToolInfo]) -> Vec<&str> {
        tools.iter().map(|t| t.name.as_str()).collect()
    }

    #[test]
    fn test_filter_all_and_none() {
        assert_eq!(filter_tools(&catalog(), &ToolPermission::all()).len(), 4);
        assert!(filter_tools(&catalog(), &ToolPermission::none()).is_empty());
    }

    #[test]
    fn test_filter_specific_preserves_catalog_order() {
        let filtered = filter_tools(
            &catalog(),
            &ToolPermission::specific(["reportOut", "Read", "Missing"]),
        );
        assert_eq!(names(&filtered), ["Read", "reportOut"]);

        let absent = filter_tools(&catalog(), &ToolPermission::specific(["Missing"]));
        assert!(absent.is_empty());
    }

    #[test]
    fn test_resolver_reflects_catalog_changes() {
        let catalog = Arc::new(StaticToolCatalog::from_names(["Read"]));
        let resolver = ToolResolver::new(catalog.clone());
        let config = AgentsConfig::new(
            "",
            vec![
                AgentDefinition::new("a", "p")
                    .with_description("d")
                    .with_use_for("u"),
            ],
        )
        .unwrap();

        assert_eq!(names(&resolver.get_available_tools("a", &config).unwrap()), ["Read"]);
        catalog.add(ToolInfo::named("Write"));
        assert_eq!(
            names(&resolver.get_available_tools("a", &config).unwrap()),
            ["Read", "Write"]
        );
        assert!(catalog.remove("Read"));
        assert!(!resolver.is_tool_allowed("a", "Read", &config).unwrap());
    }

    #[test]
    fn test_resolver_unknown_agent_is_error() {
        let resolver = ToolResolver::new(Arc::new(StaticToolCatalog::default()));
        let config = AgentsConfig::new(
            "",
            vec![
                AgentDefinition::new("a", "p")
                    .with_description("d")
                    .with_use_for("u"),
            ],
        )
        .unwrap();
        let err = resolver.get_available_tools("ghost", &config).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::ToolAccess);
        assert_eq!(err.agent(), Some("ghost"));
    }
}
