//! Agent configuration: definitions, legacy migration, validation, and
//! runtime settings.
//!
//! ```rust
//! use agent_delegation::config::AgentsConfig;
//!
//! let config = AgentsConfig::from_json(r#"{
//!     "coordinator": {"name": "lead", "systemPrompt": "Lead.", "description": "Lead",
//!                     "useFor": "Planning"},
//!     "customAgents": [{"name": "reviewer", "systemPrompt": "Review.",
//!                       "description": "Reviewer", "useFor": "Code review"}]
//! }"#).unwrap();
//! assert_eq!(config.entry_agent(), "lead");
//! ```

pub mod definition;
pub mod env;
pub mod migration;
pub mod settings;
pub mod validator;

pub use definition::{
    AgentDefinition, DelegationPermission, MAX_IDENTIFIER_LEN, ToolPermission, is_valid_identifier,
};
pub use env::EnvConfigProvider;
pub use migration::{MigratedConfig, RawAgentDefinition, RawAgentsConfig, migrate};
pub use settings::DelegationSettings;
pub use validator::{ConfigValidator, find_cycles};

use std::path::Path;

use serde::Serialize;
use thiserror::Error;

/// Errors that can occur in configuration operations
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Agent list is empty
    #[error("Configuration must declare at least one agent")]
    NoAgents,

    /// Required agent field is missing or blank
    #[error("Agent {agent} is missing required field '{field}'")]
    MissingField { agent: String, field: &'static str },

    /// Invalid configuration value
    #[error("Invalid value for {key}: {message}")]
    InvalidValue {
        /// The key with invalid value
        key: String,
        /// Error message
        message: String,
    },

    #[error("Duplicate agent name '{name}'")]
    DuplicateAgent { name: String },

    #[error("{key} lists '{entry}' more than once")]
    DuplicatePermissionEntry { key: String, entry: String },

    #[error("{key} is 'specific' but names no entries")]
    EmptyPermissionSet { key: String },

    #[error("Agent '{agent}' may delegate to unknown agent '{target}'")]
    UnknownDelegationTarget { agent: String, target: String },

    /// Cycle in the graph of `specific` delegation permissions
    #[error("Circular delegation detected: {}", cycle.join(" -> "))]
    CircularDelegation { cycle: Vec<String> },

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_bw::Error),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Environment variable error
    #[error("Environment error: {0}")]
    Env(#[from] std::env::VarError),

    /// Multiple validation errors
    #[error("{0}")]
    ValidationErrors(ValidationErrors),
}

impl ConfigError {
    pub fn is_circular(&self) -> bool {
        match self {
            ConfigError::CircularDelegation { .. } => true,
            ConfigError::ValidationErrors(errors) => errors.iter().any(ConfigError::is_circular),
            _ => false,
        }
    }

    /// Flattened view: the inner list for aggregated errors, else itself.
    pub fn errors(&self) -> Vec<&ConfigError> {
        match self {
            ConfigError::ValidationErrors(errors) => errors.iter().collect(),
            other => vec![other],
        }
    }
}

#[derive(Debug)]
pub struct ValidationErrors(pub Vec<ConfigError>);

impl ValidationErrors {
    pub fn iter(&self) -> std::slice::Iter<'_, ConfigError> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Validation failed: ")?;
        let msgs: Vec<String> = self.0.iter().map(|e| e.to_string()).collect();
        write!(f, "{}", msgs.join("; "))
    }
}

/// Non-fatal findings from validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConfigWarning {
    EntryAgentFallback { requested: String, fallback: String },
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigWarning::EntryAgentFallback {
                requested,
                fallback,
            } => write!(
                f,
                "Entry agent '{}' not found; falling back to '{}'",
                requested, fallback
            ),
        }
    }
}

/// Result type for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Validated agent configuration with a resolved entry agent.
///
/// Only constructible through validation, so every instance has at least one
/// agent, unique names, resolvable `specific` delegation references, and an
/// acyclic `specific` delegation graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentsConfig {
    entry_agent: String,
    agents: Vec<AgentDefinition>,
    #[serde(skip)]
    warnings: Vec<ConfigWarning>,
}

impl AgentsConfig {
    /// Validates `agents`; an empty `entry_agent` selects the first agent.
    pub fn new(entry_agent: impl Into<String>, agents: Vec<AgentDefinition>) -> ConfigResult<Self> {
        let entry_agent = entry_agent.into();
        let requested = Some(entry_agent.as_str()).filter(|e| !e.trim().is_empty());
        Self::validated(requested.map(str::to_string), agents)
    }

    pub fn from_raw(raw: RawAgentsConfig) -> ConfigResult<Self> {
        let migrated = migrate(raw);
        Self::validated(migrated.entry_agent, migrated.agents)
    }

    pub fn from_json(json: &str) -> ConfigResult<Self> {
        Self::from_raw(serde_json::from_str(json)?)
    }

    pub fn from_yaml(yaml: &str) -> ConfigResult<Self> {
        Self::from_raw(serde_yaml_bw::from_str(yaml)?)
    }

    /// Loads by extension: `.yaml`/`.yml` as YAML, anything else as JSON.
    pub fn from_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml" | "yml") => Self::from_yaml(&content),
            _ => Self::from_json(&content),
        }
    }

    fn validated(entry_agent: Option<String>, agents: Vec<AgentDefinition>) -> ConfigResult<Self> {
        let warnings = ConfigValidator::new().validate(entry_agent.as_deref(), &agents)?;
        for warning in &warnings {
            tracing::warn!(%warning, "Agent configuration warning");
        }

        let entry_agent = match entry_agent {
            Some(name) if agents.iter().any(|a| a.name == name) => name,
            _ => agents
                .first()
                .map(|a| a.name.clone())
                .ok_or(ConfigError::NoAgents)?,
        };

        Ok(Self {
            entry_agent,
            agents,
            warnings,
        })
    }

    pub fn entry_agent(&self) -> &str {
        &self.entry_agent
    }

    pub fn entry_definition(&self) -> Option<&AgentDefinition> {
        self.agent(&self.entry_agent)
    }

    pub fn agents(&self) -> &[AgentDefinition] {
        &self.agents
    }

    pub fn agent(&self, name: &str) -> Option<&AgentDefinition> {
        self.agents.iter().find(|a| a.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.agent(name).is_some()
    }

    pub fn agent_names(&self) -> impl Iterator<Item = &str> {
        self.agents.iter().map(|a| a.name.as_str())
    }

    pub fn warnings(&self) -> &[ConfigWarning] {
        &self.warnings
    }

    /// Pure permission check: both agents exist, differ, and `from` may
    /// delegate to `to`.
    pub fn can_delegate(&self, from: &str, to: &str) -> bool {
        self.contains(to)
            && self
                .agent(from)
                .is_some_and(|def| def.can_delegate_to(to))
    }
}
