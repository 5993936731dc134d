//! Tool execution output.

/// Result of a tool execution as shown to the calling agent.
///
/// Ordinary failures are `Error` text the agent can read and act on; only
/// cancellation escapes as `Err` from [`Tool::execute`](super::Tool::execute).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolResult {
    /// Successful result with content
    Success(String),
    /// Error result
    Error(String),
}

impl ToolResult {
    /// Create a success result
    pub fn success(content: impl Into<String>) -> Self {
        Self::Success(content.into())
    }

    /// Create an error result
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(message.into())
    }

    /// Check if this is an error
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    pub fn text(&self) -> &str {
        match self {
            Self::Success(content) | Self::Error(content) => content,
        }
    }

    pub fn into_text(self) -> String {
        match self {
            Self::Success(content) | Self::Error(content) => content,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_result() {
        assert!(!ToolResult::success("ok").is_error());
        assert!(ToolResult::error("fail").is_error());
        assert_eq!(ToolResult::error("fail").text(), "fail");
    }
}
