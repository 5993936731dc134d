//! Structured spans for delegation and report-out.

use std::time::Instant;

use tracing::{Level, Span, field, span};

use crate::agent::ConversationId;

/// Span covering one delegation from creation until the caller resumes.
pub struct DelegationSpan {
    span: Span,
    start: Instant,
}

impl DelegationSpan {
    pub fn new(from: &str, to: &str) -> Self {
        let span = span!(
            Level::INFO,
            "delegation",
            from = from,
            to = to,
            otel.name = "delegation",
            conversation_id = field::Empty,
            outcome = field::Empty,
            duration_ms = field::Empty,
        );
        Self {
            span,
            start: Instant::now(),
        }
    }

    pub fn record_conversation(&self, conversation_id: ConversationId) {
        self.span
            .record("conversation_id", field::display(conversation_id));
    }

    pub fn finish(&self, outcome: &str) {
        self.span.record("outcome", outcome);
        self.span
            .record("duration_ms", self.start.elapsed().as_millis() as u64);
    }

    pub fn span(&self) -> &Span {
        &self.span
    }
}

/// `agent` is recorded once the conversation is resolved.
pub fn report_span(conversation_id: ConversationId) -> Span {
    span!(
        Level::INFO,
        "report_out",
        agent = field::Empty,
        conversation_id = %conversation_id,
        otel.name = "report_out",
    )
}

pub fn dispatch_span(agent: &str, conversation_id: ConversationId) -> Span {
    span!(
        Level::DEBUG,
        "agent.dispatch",
        agent = agent,
        conversation_id = %conversation_id,
        otel.name = "agent.dispatch",
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delegation_span() {
        let span = DelegationSpan::new("coordinator", "reviewer");
        span.record_conversation(ConversationId::new());
        span.finish("completed");
        let _entered = span.span().enter();
    }

    #[test]
    fn test_report_span() {
        report_span(ConversationId::new()).record("agent", "reviewer");
        let _ = dispatch_span("reviewer", ConversationId::new());
    }
}
