//! reportOut tool - returns a delegate's result to the agent that delegated.

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;

use super::context::ToolContext;
use super::delegate::check_length;
use super::output::ToolResult;
use super::traits::SchemaTool;
use crate::delegation::DelegationEngine;

pub const REPORT_OUT_TOOL: &str = "reportOut";

const PREVIEW_CHARS: usize = 200;

#[derive(Debug, Deserialize, JsonSchema)]
#[schemars(deny_unknown_fields)]
pub struct ReportOutInput {
    /// Complete report for the delegating agent
    #[schemars(length(min = 10, max = 5000))]
    pub report: String,
}

/// At most 200 characters, ending in "..." when cut.
pub fn preview(report: &str) -> String {
    if report.chars().count() <= PREVIEW_CHARS {
        return report.to_string();
    }
    let mut cut: String = report.chars().take(PREVIEW_CHARS - 3).collect();
    cut.push_str("...");
    cut
}

pub struct ReportOutTool {
    engine: DelegationEngine,
}

impl ReportOutTool {
    pub fn new(engine: DelegationEngine) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl SchemaTool for ReportOutTool {
    type Input = ReportOutInput;

    const NAME: &'static str = REPORT_OUT_TOOL;
    const DESCRIPTION: &'static str = r#"
- Sends your final report to the agent that delegated work to you
- Call this exactly once, when the delegated work is complete
- The report is delivered in full; include everything the requester asked for
- Your conversation ends after the report is delivered"#;

    fn reject(reason: &str) -> ToolResult {
        ToolResult::error(format!("Report failed: Invalid input: {}", reason))
    }

    async fn handle(&self, input: ReportOutInput, context: &ToolContext) -> crate::Result<ToolResult> {
        let report = input.report.trim();
        if let Err(reason) = check_length("report", report, 10, 5000) {
            return Ok(Self::reject(&reason));
        }

        let conversation_id = context.conversation_id();
        let outcome = if self.engine.get_conversation(conversation_id).is_some() {
            self.engine
                .report_out_conversation(conversation_id, report)
                .await
                .map(|()| conversation_id)
        } else {
            self.engine.report_out(context.agent_name(), report).await
        };

        match outcome {
            Ok(id) => Ok(ToolResult::success(format!(
                "Report delivered for conversation {} ({} characters). Preview: {}",
                id,
                report.chars().count(),
                preview(report)
            ))),
            Err(e) => Ok(ToolResult::error(format!("Report failed: {}", e.message()))),
        }
    }
}
