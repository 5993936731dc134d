//! Prelude module for convenient imports.
//!
//! ```rust
//! use agent_delegation::prelude::*;
//! ```

// Core types
pub use crate::Error;
pub use crate::ErrorKind;
pub use crate::Result;

// Configuration
pub use crate::config::{
    AgentDefinition, AgentsConfig, DelegationPermission, DelegationSettings, ToolPermission,
};

// Agents
pub use crate::agent::{AgentBackend, AgentContextManager, AgentExecutionContext, ConversationId};

// Delegation
pub use crate::delegation::{ConversationRecord, ConversationStatus, DelegationEngine};

// Tools
pub use crate::tools::{
    SchemaTool, StaticToolCatalog, Tool, ToolCatalog, ToolContext, ToolInfo, ToolRegistry,
    ToolResult,
};

// Observability
pub use crate::observability::ErrorReporter;
