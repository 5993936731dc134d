//! # agent-delegation
//!
//! Delegation and orchestration core for a set of named agents that cooperate
//! inside one host-provided session.
//!
//! Each agent is a system prompt plus a restricted capability set. Agents hand
//! sub-tasks to one another with `delegateWork` and return results with
//! `reportOut`; this crate tracks who runs on whose behalf, rejects delegation
//! cycles (statically at load time and dynamically at runtime), correlates
//! each request with its eventual report, and reclaims abandoned work.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use agent_delegation::{
//!     AgentContextManager, AgentsConfig, DelegationEngine, DelegationSettings, ErrorReporter,
//!     StaticToolCatalog,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), agent_delegation::Error> {
//!     let config = AgentsConfig::from_json(r#"{
//!         "entryAgent": "coordinator",
//!         "agents": [
//!             {"name": "coordinator", "systemPrompt": "Coordinate.", "description": "Lead",
//!              "useFor": "Planning", "delegationPermissions": {"type": "all"}},
//!             {"name": "reviewer", "systemPrompt": "Review.", "description": "Reviewer",
//!              "useFor": "Code review", "toolPermissions": {"type": "specific", "tools": ["reportOut"]}}
//!         ]
//!     }"#)?;
//!
//!     let settings = DelegationSettings::default();
//!     let reporter = ErrorReporter::from_settings(&settings);
//!     let catalog = Arc::new(StaticToolCatalog::from_names(["delegateWork", "reportOut"]));
//!     let contexts = Arc::new(
//!         AgentContextManager::new(catalog, reporter.clone()).with_configuration(Arc::new(config)),
//!     );
//!     let engine = DelegationEngine::new(contexts, settings, reporter);
//!     let cleanup = engine.start_cleanup();
//!
//!     // Without an `AgentBackend` the host plays the reviewer and reports out itself.
//!     let waiting = {
//!         let engine = engine.clone();
//!         tokio::spawn(async move {
//!             engine
//!                 .delegate_work("coordinator", "reviewer", "Review module X for security issues", "Findings")
//!                 .await
//!         })
//!     };
//!     while engine.get_active_conversations().is_empty() {
//!         tokio::task::yield_now().await;
//!     }
//!     engine.report_out("reviewer", "No injection risks found in module X.").await?;
//!
//!     let report = waiting.await.expect("delegation task panicked")?;
//!     println!("{}", report);
//!     cleanup.stop().await;
//!     engine.shutdown().await;
//!     Ok(())
//! }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod agent;
pub mod config;
pub mod delegation;
pub mod observability;
pub mod prelude;
pub mod prompts;
pub mod tools;

// Re-exports for convenience
pub use agent::{AgentBackend, AgentContextManager, AgentExecutionContext, ConversationId};
pub use config::{
    AgentDefinition, AgentsConfig, ConfigError, ConfigValidator, ConfigWarning,
    DelegationPermission, DelegationSettings, EnvConfigProvider, RawAgentsConfig, ToolPermission,
};
pub use delegation::{
    CleanupTask, ConversationRecord, ConversationStats, ConversationStatus, DelegationEngine,
    DelegationStats,
};
pub use observability::{DelegationMetrics, ErrorRecord, ErrorReporter, MetricsSnapshot};
pub use prompts::{
    DelegationTarget, build_system_prompt, format_delegation_section, get_delegation_targets,
    get_enumerated_agent_names,
};
pub use tools::{
    DelegateWorkTool, ReportOutTool, SchemaTool, StaticToolCatalog, Tool, ToolCatalog,
    ToolContext, ToolInfo, ToolRegistry, ToolResolver, ToolResult, filter_tools,
};

use std::time::Duration;

/// Error type for agent-delegation operations.
///
/// The five domain kinds carry a message, the offending agent when known, and
/// optional structured detail for diagnostics.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Invalid or unusable configuration discovered at runtime.
    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        agent: Option<String>,
        details: Option<serde_json::Value>,
    },

    /// Load-time validation failed.
    #[error("Invalid configuration: {0}")]
    Config(#[from] config::ConfigError),

    /// A delegation was rejected or could not be completed.
    #[error("Delegation error: {message}")]
    Delegation {
        message: String,
        agent: Option<String>,
        details: Option<serde_json::Value>,
    },

    /// Tool lookup or tool permission failure.
    #[error("Tool access error: {message}")]
    ToolAccess {
        message: String,
        agent: Option<String>,
        details: Option<serde_json::Value>,
    },

    /// Agent context was malformed or the backend failed.
    #[error("Agent execution failed: {message}")]
    AgentExecution {
        message: String,
        agent: Option<String>,
        details: Option<serde_json::Value>,
    },

    /// Delegation would re-enter an agent already in its own ancestry.
    #[error("Circular delegation: {message}")]
    CircularDelegation {
        message: String,
        agent: Option<String>,
        chain: Vec<String>,
    },

    /// No report arrived before the delegation timeout.
    #[error("Delegation timed out after {:.1}s (conversation {conversation_id})", after.as_secs_f64())]
    Timeout {
        conversation_id: String,
        after: Duration,
    },

    /// The conversation tree was terminated while work was outstanding.
    #[error("Conversation {conversation_id} was terminated")]
    Terminated { conversation_id: String },

    /// Explicit cancellation signal from the caller.
    #[error("Operation cancelled")]
    Cancelled,

    /// JSON serialization or deserialization failed.
    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML deserialization failed.
    #[error("YAML parsing failed: {0}")]
    Yaml(#[from] serde_yaml_bw::Error),

    /// File system operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Error kind for unified error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Configuration,
    Delegation,
    ToolAccess,
    AgentExecution,
    CircularDelegation,
    Cancelled,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::Configuration => "configuration",
            ErrorKind::Delegation => "delegation",
            ErrorKind::ToolAccess => "tool_access",
            ErrorKind::AgentExecution => "agent_execution",
            ErrorKind::CircularDelegation => "circular_delegation",
            ErrorKind::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

impl Error {
    pub fn configuration(message: impl Into<String>) -> Self {
        Error::Configuration {
            message: message.into(),
            agent: None,
            details: None,
        }
    }

    pub fn delegation(message: impl Into<String>) -> Self {
        Error::Delegation {
            message: message.into(),
            agent: None,
            details: None,
        }
    }

    pub fn tool_access(message: impl Into<String>) -> Self {
        Error::ToolAccess {
            message: message.into(),
            agent: None,
            details: None,
        }
    }

    pub fn agent_execution(message: impl Into<String>) -> Self {
        Error::AgentExecution {
            message: message.into(),
            agent: None,
            details: None,
        }
    }

    pub fn circular(message: impl Into<String>, chain: Vec<String>) -> Self {
        Error::CircularDelegation {
            message: message.into(),
            agent: None,
            chain,
        }
    }

    /// Attach the offending agent name. No-op for variants without one.
    pub fn with_agent(mut self, name: impl Into<String>) -> Self {
        match &mut self {
            Error::Configuration { agent, .. }
            | Error::Delegation { agent, .. }
            | Error::ToolAccess { agent, .. }
            | Error::AgentExecution { agent, .. }
            | Error::CircularDelegation { agent, .. } => *agent = Some(name.into()),
            _ => {}
        }
        self
    }

    /// Attach structured detail. No-op for variants without a detail slot.
    pub fn with_details(mut self, value: serde_json::Value) -> Self {
        match &mut self {
            Error::Configuration { details, .. }
            | Error::Delegation { details, .. }
            | Error::ToolAccess { details, .. }
            | Error::AgentExecution { details, .. } => *details = Some(value),
            _ => {}
        }
        self
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Configuration { .. }
            | Error::Config(_)
            | Error::Json(_)
            | Error::Yaml(_)
            | Error::Io(_) => ErrorKind::Configuration,

            Error::Delegation { .. } | Error::Timeout { .. } | Error::Terminated { .. } => {
                ErrorKind::Delegation
            }

            Error::ToolAccess { .. } => ErrorKind::ToolAccess,
            Error::AgentExecution { .. } => ErrorKind::AgentExecution,
            Error::CircularDelegation { .. } => ErrorKind::CircularDelegation,
            Error::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Human-readable reason without the kind prefix.
    pub fn message(&self) -> String {
        match self {
            Error::Configuration { message, .. }
            | Error::Delegation { message, .. }
            | Error::ToolAccess { message, .. }
            | Error::AgentExecution { message, .. }
            | Error::CircularDelegation { message, .. } => message.clone(),
            Error::Config(e) => e.to_string(),
            other => other.to_string(),
        }
    }

    pub fn agent(&self) -> Option<&str> {
        match self {
            Error::Configuration { agent, .. }
            | Error::Delegation { agent, .. }
            | Error::ToolAccess { agent, .. }
            | Error::AgentExecution { agent, .. }
            | Error::CircularDelegation { agent, .. } => agent.as_deref(),
            _ => None,
        }
    }

    pub fn details(&self) -> Option<&serde_json::Value> {
        match self {
            Error::Configuration { details, .. }
            | Error::Delegation { details, .. }
            | Error::ToolAccess { details, .. }
            | Error::AgentExecution { details, .. } => details.as_ref(),
            _ => None,
        }
    }

    /// Delegation chain for circular-delegation errors.
    pub fn chain(&self) -> Option<&[String]> {
        match self {
            Error::CircularDelegation { chain, .. } => Some(chain),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::delegation("Agent 'a' is not allowed to delegate to 'b'");
        assert!(err.to_string().contains("not allowed"));
        assert_eq!(err.message(), "Agent 'a' is not allowed to delegate to 'b'");
    }

    #[test]
    fn test_error_kind() {
        assert_eq!(Error::tool_access("x").kind(), ErrorKind::ToolAccess);
        assert_eq!(Error::Cancelled.kind(), ErrorKind::Cancelled);
        let timeout = Error::Timeout {
            conversation_id: "c".into(),
            after: Duration::from_secs(300),
        };
        assert_eq!(timeout.kind(), ErrorKind::Delegation);
        assert!(timeout.to_string().contains("300.0s"));
    }

    #[test]
    fn test_error_agent_and_details() {
        let err = Error::agent_execution("backend failed")
            .with_agent("reviewer")
            .with_details(serde_json::json!({"attempt": 1}));
        assert_eq!(err.agent(), Some("reviewer"));
        assert_eq!(err.details().unwrap()["attempt"], 1);

        let cancelled = Error::Cancelled.with_agent("ignored");
        assert!(cancelled.agent().is_none());
    }

    #[test]
    fn test_circular_chain() {
        let err = Error::circular("loop", vec!["a".into(), "b".into()]).with_agent("a");
        assert_eq!(err.chain().unwrap(), ["a", "b"]);
        assert_eq!(err.kind(), ErrorKind::CircularDelegation);
    }

    #[test]
    fn test_config_error_conversion() {
        let err: Error = config::ConfigError::NoAgents.into();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }
}
