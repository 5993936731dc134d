//! Tool access and the delegation tools.
//!
//! - `access`: which catalog tools an agent may call
//! - `delegate` / `report`: the `delegateWork` and `reportOut` callable tools
//! - `registry`: dispatch of tool calls coming back from the agent backend

mod access;
mod context;
pub mod delegate;
mod output;
mod registry;
pub mod report;
mod traits;

pub use access::{StaticToolCatalog, ToolCatalog, ToolInfo, ToolResolver, filter_tools};
pub use context::ToolContext;
pub use delegate::{DELEGATE_WORK_TOOL, DelegateWorkInput, DelegateWorkTool};
pub use output::ToolResult;
pub use registry::ToolRegistry;
pub use report::{REPORT_OUT_TOOL, ReportOutInput, ReportOutTool};
pub use traits::{SchemaTool, Tool, ToolDefinition};
