//! Legacy configuration migration.
//!
//! Older hosts store `{coordinator, customAgents}`; current hosts store
//! `{entryAgent, agents}`. Both are accepted here and folded into one
//! canonical agent list exactly once, before validation.

use serde::{Deserialize, Serialize};

use super::definition::{AgentDefinition, DelegationPermission, ToolPermission};

/// Agent entry as stored, with every field optional so that missing fields
/// reach the validator instead of failing deserialization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawAgentDefinition {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub use_for: Option<String>,
    #[serde(default)]
    pub delegation_permissions: Option<DelegationPermission>,
    #[serde(default)]
    pub tool_permissions: Option<ToolPermission>,
}

impl RawAgentDefinition {
    fn into_definition(self, default_delegation: DelegationPermission) -> AgentDefinition {
        AgentDefinition {
            name: self.name.unwrap_or_default(),
            system_prompt: self.system_prompt.unwrap_or_default(),
            description: self.description.unwrap_or_default(),
            use_for: self.use_for.unwrap_or_default(),
            delegation_permissions: self.delegation_permissions.unwrap_or(default_delegation),
            tool_permissions: self.tool_permissions.unwrap_or_default(),
        }
    }
}

impl From<AgentDefinition> for RawAgentDefinition {
    fn from(def: AgentDefinition) -> Self {
        Self {
            name: Some(def.name),
            system_prompt: Some(def.system_prompt),
            description: Some(def.description),
            use_for: Some(def.use_for),
            delegation_permissions: Some(def.delegation_permissions),
            tool_permissions: Some(def.tool_permissions),
        }
    }
}

/// Configuration as supplied by the external loader, either shape.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawAgentsConfig {
    #[serde(default)]
    pub entry_agent: Option<String>,
    #[serde(default)]
    pub agents: Vec<RawAgentDefinition>,
    #[serde(default)]
    pub coordinator: Option<RawAgentDefinition>,
    #[serde(default)]
    pub custom_agents: Vec<RawAgentDefinition>,
}

impl RawAgentsConfig {
    pub fn is_legacy(&self) -> bool {
        self.coordinator.is_some() || !self.custom_agents.is_empty()
    }
}

/// Canonical shape produced by [`migrate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigratedConfig {
    pub entry_agent: Option<String>,
    pub agents: Vec<AgentDefinition>,
    pub migrated_legacy: bool,
}

/// Folds the legacy shape into the canonical one.
///
/// The coordinator becomes the first agent and the default entry agent unless
/// `entryAgent` is set explicitly. Canonical entries override legacy entries
/// with the same name in place; others are appended in order.
pub fn migrate(raw: RawAgentsConfig) -> MigratedConfig {
    let migrated_legacy = raw.is_legacy();
    let explicit_entry = raw.entry_agent.filter(|e| !e.trim().is_empty());

    let mut agents: Vec<AgentDefinition> = Vec::new();
    let mut coordinator_name = None;

    if let Some(coordinator) = raw.coordinator {
        let def = coordinator.into_definition(DelegationPermission::All);
        coordinator_name = Some(def.name.clone()).filter(|n| !n.is_empty());
        agents.push(def);
    }
    agents.extend(
        raw.custom_agents
            .into_iter()
            .map(|a| a.into_definition(DelegationPermission::None)),
    );

    for def in raw
        .agents
        .into_iter()
        .map(|a| a.into_definition(DelegationPermission::None))
    {
        let existing = if migrated_legacy && !def.name.is_empty() {
            agents.iter().position(|a| a.name == def.name)
        } else {
            None
        };
        match existing {
            Some(idx) => agents[idx] = def,
            None => agents.push(def),
        }
    }

    if migrated_legacy {
        tracing::debug!(agents = agents.len(), "Migrated legacy agent configuration");
    }

    MigratedConfig {
        entry_agent: explicit_entry.or(coordinator_name),
        agents,
        migrated_legacy,
    }
}
