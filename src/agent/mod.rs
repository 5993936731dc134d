//! Agent contexts and their lifecycle.

mod backend;
mod context;
mod ids;
mod manager;

pub use backend::AgentBackend;
pub use context::AgentExecutionContext;
pub use ids::ConversationId;
pub use manager::AgentContextManager;
