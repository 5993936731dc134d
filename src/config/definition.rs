//! Agent definitions and permission policies.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Maximum length of an agent or tool identifier.
pub const MAX_IDENTIFIER_LEN: usize = 50;

fn identifier_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("valid identifier regex"))
}

/// Checks `[A-Za-z0-9_-]{1,50}`.
pub fn is_valid_identifier(name: &str) -> bool {
    !name.is_empty() && name.len() <= MAX_IDENTIFIER_LEN && identifier_regex().is_match(name)
}

/// Which agents a given agent may delegate to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DelegationPermission {
    /// Every other declared agent.
    All,
    /// No delegation at all.
    #[default]
    None,
    /// Only the named agents.
    Specific {
        #[serde(default)]
        agents: Vec<String>,
    },
}

impl DelegationPermission {
    pub fn all() -> Self {
        Self::All
    }

    pub fn none() -> Self {
        Self::None
    }

    pub fn specific(agents: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self::Specific {
            agents: agents.into_iter().map(Into::into).collect(),
        }
    }

    /// Permission check only; does not know whether `target` exists.
    #[inline]
    pub fn allows(&self, target: &str) -> bool {
        match self {
            Self::All => true,
            Self::None => false,
            Self::Specific { agents } => agents.iter().any(|a| a == target),
        }
    }

    pub fn specific_entries(&self) -> Option<&[String]> {
        match self {
            Self::Specific { agents } => Some(agents),
            Self::All | Self::None => None,
        }
    }
}

/// Which host tools a given agent may call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolPermission {
    /// The whole host catalog.
    #[default]
    All,
    /// No tools.
    None,
    /// Only the named tools.
    Specific {
        #[serde(default)]
        tools: Vec<String>,
    },
}

impl ToolPermission {
    pub fn all() -> Self {
        Self::All
    }

    pub fn none() -> Self {
        Self::None
    }

    pub fn specific(tools: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self::Specific {
            tools: tools.into_iter().map(Into::into).collect(),
        }
    }

    #[inline]
    pub fn allows(&self, tool_name: &str) -> bool {
        match self {
            Self::All => true,
            Self::None => false,
            Self::Specific { tools } => tools.iter().any(|t| t == tool_name),
        }
    }

    pub fn specific_entries(&self) -> Option<&[String]> {
        match self {
            Self::Specific { tools } => Some(tools),
            Self::All | Self::None => None,
        }
    }
}

/// A named agent persona: prompt plus permissions.
///
/// Immutable once loaded; a configuration reload replaces it wholesale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentDefinition {
    pub name: String,
    pub system_prompt: String,
    pub description: String,
    pub use_for: String,
    #[serde(default)]
    pub delegation_permissions: DelegationPermission,
    #[serde(default)]
    pub tool_permissions: ToolPermission,
}

impl AgentDefinition {
    pub fn new(name: impl Into<String>, system_prompt: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            system_prompt: system_prompt.into(),
            description: String::new(),
            use_for: String::new(),
            delegation_permissions: DelegationPermission::default(),
            tool_permissions: ToolPermission::default(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_use_for(mut self, use_for: impl Into<String>) -> Self {
        self.use_for = use_for.into();
        self
    }

    pub fn with_delegation(mut self, permission: DelegationPermission) -> Self {
        self.delegation_permissions = permission;
        self
    }

    pub fn with_tools(mut self, permission: ToolPermission) -> Self {
        self.tool_permissions = permission;
        self
    }

    pub fn can_delegate_to(&self, target: &str) -> bool {
        target != self.name && self.delegation_permissions.allows(target)
    }
}
