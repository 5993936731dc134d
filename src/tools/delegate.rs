//! delegateWork tool - hands a sub-task to another agent and waits for its report.

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;

use super::context::ToolContext;
use super::output::ToolResult;
use super::traits::SchemaTool;
use crate::config::{MAX_IDENTIFIER_LEN, is_valid_identifier};
use crate::delegation::DelegationEngine;

pub const DELEGATE_WORK_TOOL: &str = "delegateWork";

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
#[schemars(deny_unknown_fields)]
pub struct DelegateWorkInput {
    /// Exact name of the agent to delegate to
    #[schemars(length(min = 1, max = 50), regex(pattern = r"^[A-Za-z0-9_-]+$"))]
    pub agent_name: String,
    /// What the agent should do, with all context it needs
    #[schemars(length(min = 10, max = 2000))]
    pub work_description: String,
    /// What the report should contain when the work is done
    #[schemars(length(min = 5, max = 500))]
    pub report_expectations: String,
}

impl DelegateWorkInput {
    pub fn validate(&self) -> Result<(), String> {
        if !is_valid_identifier(&self.agent_name) {
            return Err(format!(
                "agentName must be 1-{} characters of letters, digits, '_' or '-'",
                MAX_IDENTIFIER_LEN
            ));
        }
        check_length("workDescription", &self.work_description, 10, 2000)?;
        check_length("reportExpectations", &self.report_expectations, 5, 500)
    }
}

pub(crate) fn check_length(field: &str, value: &str, min: usize, max: usize) -> Result<(), String> {
    let len = value.chars().count();
    if len < min || len > max {
        return Err(format!(
            "{} must be between {} and {} characters (got {})",
            field, min, max, len
        ));
    }
    Ok(())
}

pub struct DelegateWorkTool {
    engine: DelegationEngine,
}

impl DelegateWorkTool {
    pub fn new(engine: DelegationEngine) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl SchemaTool for DelegateWorkTool {
    type Input = DelegateWorkInput;

    const NAME: &'static str = DELEGATE_WORK_TOOL;
    const DESCRIPTION: &'static str = r#"
- Delegates a sub-task to another agent and waits for that agent's report
- agentName must be one of the agent names listed in your instructions
- workDescription should be self-contained: the other agent does not see your conversation
- reportExpectations tells the agent what its report must contain
- Returns the delegate's full report once it calls reportOut"#;

    fn reject(reason: &str) -> ToolResult {
        ToolResult::error(format!("Delegation failed: Invalid input: {}", reason))
    }

    async fn handle(
        &self,
        input: DelegateWorkInput,
        context: &ToolContext,
    ) -> crate::Result<ToolResult> {
        if let Err(reason) = input.validate() {
            return Ok(Self::reject(&reason));
        }

        let cancel = context.cancellation().clone();
        let has_context = self
            .engine
            .contexts()
            .get_agent_context_by_conversation(context.conversation_id())
            .await
            .is_some();
        let outcome = if has_context {
            self.engine
                .delegate_from_conversation_with_cancel(
                    context.conversation_id(),
                    &input.agent_name,
                    &input.work_description,
                    &input.report_expectations,
                    cancel,
                )
                .await
        } else {
            self.engine
                .delegate_work_with_cancel(
                    context.agent_name(),
                    &input.agent_name,
                    &input.work_description,
                    &input.report_expectations,
                    cancel,
                )
                .await
        };

        match outcome {
            Ok(report) => Ok(ToolResult::success(format!(
                "Agent '{}' completed the delegated work.\n\nReport:\n{}",
                input.agent_name, report
            ))),
            Err(e) if e.is_cancelled() => Err(e),
            Err(e) => Ok(ToolResult::error(format!("Delegation failed: {}", e.message()))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(agent: &str, work: &str, expectations: &str) -> DelegateWorkInput {
        DelegateWorkInput {
            agent_name: agent.into(),
            work_description: work.into(),
            report_expectations: expectations.into(),
        }
    }

    #[test]
    fn test_validate_lengths() {
        assert!(input("reviewer", "Review module X", "Findings").validate().is_ok());
        assert!(input("", "Review module X", "Findings").validate().is_err());
        assert!(input("bad name", "Review module X", "Findings").validate().is_err());
        assert!(input(&"a".repeat(51), "Review module X", "Findings").validate().is_err());

        let err = input("reviewer", "too short", "Findings").validate().unwrap_err();
        assert!(err.contains("workDescription"));
        assert!(input("reviewer", &"w".repeat(2001), "Findings").validate().is_err());
        assert!(input("reviewer", "Review module X", "tiny").validate().is_err());
        assert!(input("reviewer", "Review module X", &"e".repeat(501)).validate().is_err());
    }

    #[test]
    fn test_lengths_count_characters() {
        assert!(check_length("f", "héllo wörld", 10, 11).is_ok());
    }

    #[test]
    fn test_schema_uses_camel_case() {
        let schema = DelegateWorkTool::input_schema();
        let props = schema["properties"].as_object().unwrap();
        assert!(props.contains_key("agentName"));
        assert!(props.contains_key("workDescription"));
        assert!(props.contains_key("reportExpectations"));
    }
}
