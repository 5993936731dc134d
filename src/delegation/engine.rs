//! Delegation engine: permission checks, correlation of each delegation with
//! its report, timeouts and subtree termination.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use chrono::{TimeDelta, Utc};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, warn};

use super::cleanup::CleanupTask;
use super::conversation::{ConversationRecord, ConversationStatus, ConversationTable};
use super::stats::{ConversationStats, DelegationStats};
use crate::agent::{AgentContextManager, AgentExecutionContext, ConversationId};
use crate::config::{AgentDefinition, AgentsConfig, DelegationSettings};
use crate::observability::{
    DelegationMetrics, DelegationOutcome, DelegationSpan, ErrorReporter, dispatch_span,
    report_span,
};
use crate::prompts::render_work_request;
use crate::{Error, Result};

enum Wake {
    Settled(Option<Result<String>>),
    Cancelled,
    TimedOut,
}

/// Routes work between agents and suspends each delegating caller until the
/// delegate reports out, the delegation times out, or its conversation tree
/// is terminated. Whichever happens first wins; later attempts are no-ops.
///
/// Cloning is cheap and every clone shares the same state.
#[derive(Clone)]
pub struct DelegationEngine {
    contexts: Arc<AgentContextManager>,
    settings: DelegationSettings,
    reporter: Arc<ErrorReporter>,
    metrics: Arc<DelegationMetrics>,
    conversations: Arc<Mutex<ConversationTable>>,
    lifecycle: CancellationToken,
}

impl DelegationEngine {
    pub fn new(
        contexts: Arc<AgentContextManager>,
        settings: DelegationSettings,
        reporter: Arc<ErrorReporter>,
    ) -> Self {
        Self {
            contexts,
            settings,
            reporter,
            metrics: Arc::new(DelegationMetrics::new()),
            conversations: Arc::new(Mutex::new(ConversationTable::default())),
            lifecycle: CancellationToken::new(),
        }
    }

    pub fn contexts(&self) -> &Arc<AgentContextManager> {
        &self.contexts
    }

    pub fn settings(&self) -> &DelegationSettings {
        &self.settings
    }

    pub fn metrics(&self) -> &Arc<DelegationMetrics> {
        &self.metrics
    }

    pub fn reporter(&self) -> &Arc<ErrorReporter> {
        &self.reporter
    }

    fn table(&self) -> MutexGuard<'_, ConversationTable> {
        self.conversations.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Pure permission check against the installed configuration.
    pub fn is_valid_delegation(&self, from: &str, to: &str) -> bool {
        from != to
            && self
                .contexts
                .configuration()
                .is_some_and(|config| config.can_delegate(from, to))
    }

    /// Delegates on behalf of `from`'s most recent context, creating a root
    /// context for `from` when it has none. Resolves to the delegate's report.
    pub async fn delegate_work(
        &self,
        from: &str,
        to: &str,
        work_description: &str,
        report_expectations: &str,
    ) -> Result<String> {
        self.delegate_work_with_cancel(
            from,
            to,
            work_description,
            report_expectations,
            CancellationToken::new(),
        )
        .await
    }

    /// Like [`delegate_work`](Self::delegate_work); firing `cancel` terminates
    /// the delegate's subtree and returns [`Error::Cancelled`].
    pub async fn delegate_work_with_cancel(
        &self,
        from: &str,
        to: &str,
        work_description: &str,
        report_expectations: &str,
        cancel: CancellationToken,
    ) -> Result<String> {
        let (config, target) = self.precheck(from, to)?;
        let parent = match self.contexts.get_agent_context(from).await {
            Some(parent) => parent,
            None => {
                let definition = config.agent(from).ok_or_else(|| {
                    self.rejected(
                        Error::delegation(format!("Agent '{}' not found in configuration", from))
                            .with_agent(from),
                    )
                })?;
                debug!(agent = %from, "Creating root context for delegating agent");
                self.contexts
                    .initialize_agent(definition, Some(&config))
                    .await?
            }
        };

        self.delegate(
            parent,
            &config,
            target,
            work_description,
            report_expectations,
            cancel,
        )
        .await
    }

    /// Delegates on behalf of the agent running conversation `parent_id`.
    pub async fn delegate_from_conversation(
        &self,
        parent_id: ConversationId,
        to: &str,
        work_description: &str,
        report_expectations: &str,
    ) -> Result<String> {
        self.delegate_from_conversation_with_cancel(
            parent_id,
            to,
            work_description,
            report_expectations,
            CancellationToken::new(),
        )
        .await
    }

    pub async fn delegate_from_conversation_with_cancel(
        &self,
        parent_id: ConversationId,
        to: &str,
        work_description: &str,
        report_expectations: &str,
        cancel: CancellationToken,
    ) -> Result<String> {
        let parent = self
            .contexts
            .get_agent_context_by_conversation(parent_id)
            .await
            .ok_or_else(|| {
                self.rejected(Error::delegation(format!(
                    "Conversation '{}' has no live agent context",
                    parent_id
                )))
            })?;
        let (config, target) = self.precheck(&parent.agent_name, to)?;

        self.delegate(
            parent,
            &config,
            target,
            work_description,
            report_expectations,
            cancel,
        )
        .await
    }

    fn rejected(&self, err: Error) -> Error {
        self.metrics.record_rejected();
        self.reporter.report(&err);
        err
    }

    fn precheck(&self, from: &str, to: &str) -> Result<(Arc<AgentsConfig>, AgentDefinition)> {
        if from == to {
            return Err(self.rejected(
                Error::delegation(format!("Agent '{}' cannot delegate to itself", from))
                    .with_agent(from),
            ));
        }
        if self.lifecycle.is_cancelled() {
            return Err(self.rejected(Error::delegation("Delegation engine has been shut down")));
        }

        let config = self.contexts.configuration().ok_or_else(|| {
            self.rejected(Error::configuration("No agent configuration installed"))
        })?;
        let Some(target) = config.agent(to).cloned() else {
            return Err(self.rejected(
                Error::delegation(format!("Agent '{}' not found in configuration", to))
                    .with_agent(from),
            ));
        };
        if !config.can_delegate(from, to) {
            return Err(self.rejected(
                Error::delegation(format!(
                    "Agent '{}' is not allowed to delegate to '{}'",
                    from, to
                ))
                .with_agent(from)
                .with_details(serde_json::json!({ "from": from, "to": to })),
            ));
        }
        Ok((config, target))
    }

    async fn delegate(
        &self,
        parent: AgentExecutionContext,
        config: &AgentsConfig,
        target: AgentDefinition,
        work_description: &str,
        report_expectations: &str,
        cancel: CancellationToken,
    ) -> Result<String> {
        let from = parent.agent_name.clone();
        let to = target.name.clone();

        if parent.would_cycle_to(&to) {
            let mut chain: Vec<String> = parent.lineage().map(str::to_string).collect();
            chain.push(to.clone());
            return Err(self.rejected(
                Error::circular(
                    format!(
                        "Delegating from '{}' to '{}' would create a cycle: {}",
                        from,
                        to,
                        chain.join(" -> ")
                    ),
                    chain,
                )
                .with_agent(from),
            ));
        }

        let child = self
            .contexts
            .initialize_child_agent(&target, &parent, Some(config))
            .await
            .inspect_err(|_| self.metrics.record_rejected())?;
        let conversation_id = child.conversation_id;

        let (tx, rx) = oneshot::channel();
        let now = Utc::now();
        self.table().open(
            ConversationRecord {
                conversation_id,
                agent_name: to.clone(),
                parent_conversation_id: Some(parent.conversation_id),
                parent_agent: from.clone(),
                status: ConversationStatus::Pending,
                created_at: now,
                last_activity: now,
                failure: None,
            },
            tx,
        );
        self.metrics.record_started(&to);

        let span = DelegationSpan::new(&from, &to);
        span.record_conversation(conversation_id);
        info!(parent: span.span(), from = %from, to = %to, conversation_id = %conversation_id, "Delegation started");

        if self.settings.dispatch_on_delegate && self.contexts.has_backend() {
            let input = render_work_request(&from, work_description, report_expectations);
            self.dispatch(child, input);
        }

        let started = Instant::now();
        let (result, outcome) = self
            .await_outcome(conversation_id, rx, cancel)
            .instrument(span.span().clone())
            .await;
        self.metrics.record_finished(&to, outcome, started.elapsed());

        match &result {
            Ok(report) => {
                span.finish("completed");
                info!(parent: span.span(), report_len = report.len(), "Delegation completed");
            }
            Err(e) => {
                span.finish(outcome_label(outcome));
                self.reporter.report(e);
            }
        }
        result
    }

    async fn await_outcome(
        &self,
        conversation_id: ConversationId,
        mut rx: oneshot::Receiver<Result<String>>,
        cancel: CancellationToken,
    ) -> (Result<String>, DelegationOutcome) {
        let wake = tokio::select! {
            biased;
            received = &mut rx => Wake::Settled(received.ok()),
            _ = cancel.cancelled() => Wake::Cancelled,
            _ = tokio::time::sleep(self.settings.timeout) => Wake::TimedOut,
        };

        match wake {
            Wake::Settled(received) => classify(conversation_id, received),
            Wake::Cancelled => {
                debug!(conversation_id = %conversation_id, "Delegation cancelled by caller");
                self.terminate_with(conversation_id, Some(Error::Cancelled))
                    .await;
                (Err(Error::Cancelled), DelegationOutcome::Cancelled)
            }
            Wake::TimedOut => {
                warn!(
                    conversation_id = %conversation_id,
                    timeout_secs = self.settings.timeout.as_secs_f64(),
                    "Delegation timed out"
                );
                let timeout = Error::Timeout {
                    conversation_id: conversation_id.to_string(),
                    after: self.settings.timeout,
                };
                self.terminate_with(conversation_id, Some(timeout)).await;
                // A report that landed just before the timeout still wins.
                classify(conversation_id, rx.try_recv().ok())
            }
        }
    }

    fn dispatch(&self, child: AgentExecutionContext, input: String) {
        let engine = self.clone();
        let span = dispatch_span(&child.agent_name, child.conversation_id);
        tokio::spawn(
            async move {
                let conversation_id = child.conversation_id;
                match engine.contexts.execute_agent(&child, &input).await {
                    Ok(_) if engine.is_pending(conversation_id) => {
                        debug!("Agent finished its turn without reporting out");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        engine.terminate_with(conversation_id, Some(e)).await;
                    }
                }
            }
            .instrument(span),
        );
    }

    fn is_pending(&self, conversation_id: ConversationId) -> bool {
        self.table()
            .get(&conversation_id)
            .is_some_and(|e| e.record.status.is_pending())
    }

    /// Completes the most recently created pending conversation of
    /// `agent_name`. Prefer [`report_out_conversation`](Self::report_out_conversation)
    /// when the conversation id is known.
    pub async fn report_out(
        &self,
        agent_name: &str,
        report: impl Into<String>,
    ) -> Result<ConversationId> {
        let conversation_id = self.table().latest_pending(agent_name).ok_or_else(|| {
            let err = Error::delegation(format!(
                "No pending conversation found for agent '{}'",
                agent_name
            ))
            .with_agent(agent_name);
            self.reporter.report(&err);
            err
        })?;
        self.report_out_conversation(conversation_id, report)
            .await
            .map(|()| conversation_id)
    }

    /// Resolves the caller waiting on `conversation_id` with `report`, then
    /// terminates the reporting agent's context and anything it still has
    /// outstanding.
    pub async fn report_out_conversation(
        &self,
        conversation_id: ConversationId,
        report: impl Into<String>,
    ) -> Result<()> {
        let report = report.into();
        async {
            let settled = {
                let mut table = self.table();
                match table.get_mut(&conversation_id) {
                    None => Err(Error::delegation(format!(
                        "Conversation '{}' not found",
                        conversation_id
                    ))),
                    Some(entry) if !entry.record.status.is_pending() => Err(Error::delegation(
                        format!(
                            "Conversation '{}' is already {}",
                            conversation_id, entry.record.status
                        ),
                    )
                    .with_agent(entry.record.agent_name.clone())),
                    Some(entry) => {
                        let agent = entry.record.agent_name.clone();
                        entry.settle(Ok(report));
                        Ok(agent)
                    }
                }
            };

            let agent = settled.inspect_err(|e| self.reporter.report(e))?;
            tracing::Span::current().record("agent", agent.as_str());
            info!(agent = %agent, "Report delivered");
            let orphaned = self.terminate_with(conversation_id, None).await;
            if orphaned > 0 {
                warn!(agent = %agent, orphaned, "Reporting agent left delegations outstanding");
            }
            Ok(())
        }
        .instrument(report_span(conversation_id))
        .await
    }

    /// Fails every pending conversation in the tree rooted at `root` with
    /// `root_error` for the root and a termination error for descendants,
    /// then removes the tree's agent contexts. Returns how many pending
    /// conversations were failed.
    async fn terminate_with(&self, root: ConversationId, mut root_error: Option<Error>) -> usize {
        let rejected = {
            let mut table = self.table();
            let mut rejected = 0;
            for id in table.subtree(root) {
                let error = if id == root { root_error.take() } else { None }
                    .unwrap_or_else(|| Error::Terminated {
                        conversation_id: id.to_string(),
                    });
                if let Some(entry) = table.get_mut(&id)
                    && entry.settle(Err(error))
                {
                    rejected += 1;
                }
            }
            rejected
        };

        self.contexts.terminate_agent_by_conversation(root).await;
        rejected
    }

    /// Terminates `conversation_id` and every descendant, rejecting the
    /// callers still waiting on any of them. Returns how many were rejected.
    pub async fn terminate_conversation_tree(&self, conversation_id: ConversationId) -> usize {
        let rejected = self
            .terminate_with(
                conversation_id,
                Some(Error::Terminated {
                    conversation_id: conversation_id.to_string(),
                }),
            )
            .await;
        info!(conversation_id = %conversation_id, rejected, "Conversation tree terminated");
        rejected
    }

    /// Marks a conversation as alive. Returns false for unknown ids.
    pub fn update_conversation_activity(&self, conversation_id: ConversationId) -> bool {
        match self.table().get_mut(&conversation_id) {
            Some(entry) => {
                entry.record.last_activity = Utc::now();
                true
            }
            None => false,
        }
    }

    /// Pending conversations, oldest first.
    pub fn get_active_conversations(&self) -> Vec<ConversationRecord> {
        self.table().records_where(|r| r.status.is_pending())
    }

    pub fn get_child_conversations(&self, parent_id: ConversationId) -> Vec<ConversationRecord> {
        self.table()
            .records_where(|r| r.parent_conversation_id == Some(parent_id))
    }

    pub fn get_conversation(&self, conversation_id: ConversationId) -> Option<ConversationRecord> {
        self.table()
            .get(&conversation_id)
            .map(|e| e.record.clone())
    }

    pub fn get_conversation_stats(&self) -> ConversationStats {
        let table = self.table();
        ConversationStats::from_records(table.entries().map(|e| &e.record))
    }

    pub async fn get_delegation_stats(&self) -> DelegationStats {
        let conversations = self.get_conversation_stats();
        DelegationStats {
            pending_delegations: conversations.active,
            active_contexts: self.contexts.active_count().await,
            active_agents: self.contexts.get_active_agents().await,
            conversations,
            metrics: self.metrics.snapshot(),
        }
    }

    /// Prunes records idle longer than the retention period, whatever their
    /// status. Pruned pending conversations are terminated first, together
    /// with any pending descendants. Returns how many records were pruned.
    pub async fn cleanup(&self) -> usize {
        let Some(cutoff) = TimeDelta::from_std(self.settings.retention)
            .ok()
            .and_then(|retention| Utc::now().checked_sub_signed(retention))
        else {
            return 0;
        };

        let (pruned, abandoned) = {
            let mut table = self.table();
            let mut pruned = table.prune(cutoff);
            let abandoned: Vec<ConversationId> = pruned
                .iter_mut()
                .filter_map(|entry| {
                    let id = entry.record.conversation_id;
                    entry
                        .settle(Err(Error::Terminated {
                            conversation_id: id.to_string(),
                        }))
                        .then_some(id)
                })
                .collect();
            (pruned.len(), abandoned)
        };

        let mut orphaned = 0;
        for id in &abandoned {
            orphaned += self.terminate_with(*id, None).await;
        }
        if pruned > 0 {
            debug!(pruned, abandoned = abandoned.len(), orphaned, "Stale conversations pruned");
        }
        pruned
    }

    /// Runs [`cleanup`](Self::cleanup) every `cleanup_interval` until the
    /// returned task is stopped or the engine shuts down.
    pub fn start_cleanup(&self) -> CleanupTask {
        let engine = self.clone();
        CleanupTask::spawn(
            self.settings.cleanup_interval,
            self.lifecycle.child_token(),
            move || {
                let engine = engine.clone();
                async move { engine.cleanup().await }
            },
        )
    }

    /// Stops background cleanup, refuses new delegations, terminates every
    /// pending conversation and releases every remaining agent context,
    /// including roots created on behalf of callers. Returns how many callers
    /// were released.
    pub async fn shutdown(&self) -> usize {
        self.lifecycle.cancel();
        let roots: Vec<ConversationId> = self
            .get_active_conversations()
            .into_iter()
            .map(|r| r.conversation_id)
            .collect();

        let mut released = 0;
        for id in roots {
            released += self
                .terminate_with(
                    id,
                    Some(Error::Terminated {
                        conversation_id: id.to_string(),
                    }),
                )
                .await;
        }
        let contexts = self.contexts.terminate_all().await;
        info!(released, contexts, "Delegation engine shut down");
        released
    }

    pub fn is_shut_down(&self) -> bool {
        self.lifecycle.is_cancelled()
    }
}

impl std::fmt::Debug for DelegationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DelegationEngine")
            .field("settings", &self.settings)
            .field("conversations", &self.table().len())
            .finish_non_exhaustive()
    }
}

fn classify(
    conversation_id: ConversationId,
    received: Option<Result<String>>,
) -> (Result<String>, DelegationOutcome) {
    match received {
        Some(Ok(report)) => (Ok(report), DelegationOutcome::Completed),
        Some(Err(e)) => {
            let outcome = match &e {
                Error::Timeout { .. } => DelegationOutcome::TimedOut,
                Error::Terminated { .. } => DelegationOutcome::Terminated,
                Error::Cancelled => DelegationOutcome::Cancelled,
                _ => DelegationOutcome::Failed,
            };
            (Err(e), outcome)
        }
        // Record pruned or engine dropped while the caller waited.
        None => (
            Err(Error::Terminated {
                conversation_id: conversation_id.to_string(),
            }),
            DelegationOutcome::Terminated,
        ),
    }
}

fn outcome_label(outcome: DelegationOutcome) -> &'static str {
    match outcome {
        DelegationOutcome::Completed => "completed",
        DelegationOutcome::Failed => "failed",
        DelegationOutcome::TimedOut => "timed_out",
        DelegationOutcome::Cancelled => "cancelled",
        DelegationOutcome::Terminated => "terminated",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DelegationPermission, ToolPermission};
    use crate::tools::StaticToolCatalog;
    use std::time::Duration;

    fn agent(name: &str) -> AgentDefinition {
        AgentDefinition::new(name, format!("You are {name}."))
            .with_description(name)
            .with_use_for(format!("{name} work"))
    }

    fn build_engine(settings: DelegationSettings) -> DelegationEngine {
        let config = AgentsConfig::new(
            "coordinator",
            vec![
                agent("coordinator").with_delegation(DelegationPermission::all()),
                agent("lead").with_delegation(DelegationPermission::specific(["worker"])),
                agent("worker").with_tools(ToolPermission::specific(["reportOut"])),
            ],
        )
        .unwrap();
        let reporter = ErrorReporter::from_settings(&settings);
        let catalog = Arc::new(StaticToolCatalog::from_names(["delegateWork", "reportOut"]));
        let contexts = Arc::new(
            AgentContextManager::new(catalog, reporter.clone()).with_configuration(Arc::new(config)),
        );
        DelegationEngine::new(contexts, settings, reporter)
    }

    async fn wait_for_pending(engine: &DelegationEngine, n: usize) {
        while engine.get_active_conversations().len() < n {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_report_resolves_waiting_caller() {
        let engine = build_engine(DelegationSettings::default());
        let waiter = {
            let engine = engine.clone();
            tokio::spawn(async move {
                engine
                    .delegate_work("coordinator", "worker", "Do the work please", "A report")
                    .await
            })
        };
        wait_for_pending(&engine, 1).await;

        let id = engine.report_out("worker", "All work finished.").await.unwrap();
        assert_eq!(waiter.await.unwrap().unwrap(), "All work finished.");

        let record = engine.get_conversation(id).unwrap();
        assert_eq!(record.status, ConversationStatus::Completed);
        assert_eq!(record.parent_agent, "coordinator");
        assert!(engine.contexts().get_agent_context("worker").await.is_none());
        assert_eq!(engine.metrics().snapshot().completed, 1);
    }

    #[tokio::test]
    async fn test_rejections_do_not_create_conversations() {
        let engine = build_engine(DelegationSettings::default());

        let err = engine.delegate_work("worker", "worker", "x", "y").await.unwrap_err();
        assert!(err.message().contains("cannot delegate to itself"));

        let err = engine.delegate_work("worker", "lead", "x", "y").await.unwrap_err();
        assert!(err.message().contains("not allowed"));

        let err = engine.delegate_work("coordinator", "ghost", "x", "y").await.unwrap_err();
        assert!(err.message().contains("not found"));

        assert_eq!(engine.get_conversation_stats().total, 0);
        assert_eq!(engine.metrics().snapshot().rejected, 3);
        assert_eq!(engine.reporter().len(), 3);
        assert!(!engine.is_valid_delegation("lead", "coordinator"));
        assert!(engine.is_valid_delegation("lead", "worker"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_fails_conversation() {
        let engine = build_engine(DelegationSettings::default().with_timeout(Duration::from_secs(5)));
        let err = engine
            .delegate_work("coordinator", "worker", "Never reported", "Nothing")
            .await
            .unwrap_err();
        assert!(err.is_timeout());

        let stats = engine.get_conversation_stats();
        assert_eq!((stats.failed, stats.active), (1, 0));
        assert_eq!(engine.metrics().snapshot().timed_out, 1);
        assert!(engine.report_out("worker", "Too late now.").await.is_err());
    }

    #[tokio::test]
    async fn test_report_out_twice_is_rejected() {
        let engine = build_engine(DelegationSettings::default());
        let waiter = {
            let engine = engine.clone();
            tokio::spawn(async move {
                engine.delegate_work("coordinator", "worker", "Work", "Report").await
            })
        };
        wait_for_pending(&engine, 1).await;
        let id = engine.get_active_conversations()[0].conversation_id;

        engine.report_out_conversation(id, "first report").await.unwrap();
        let err = engine.report_out_conversation(id, "second report").await.unwrap_err();
        assert!(err.message().contains("already completed"));
        assert_eq!(waiter.await.unwrap().unwrap(), "first report");
    }

    #[tokio::test]
    async fn test_cleanup_prunes_only_stale_records() {
        let engine = build_engine(DelegationSettings::default().with_retention(Duration::ZERO));
        let waiter = {
            let engine = engine.clone();
            tokio::spawn(async move {
                engine.delegate_work("coordinator", "worker", "Work", "Report").await
            })
        };
        wait_for_pending(&engine, 1).await;
        tokio::time::sleep(Duration::from_millis(5)).await;

        assert_eq!(engine.cleanup().await, 1);
        assert!(matches!(waiter.await.unwrap(), Err(Error::Terminated { .. })));
        assert_eq!(engine.get_conversation_stats().total, 0);

        let fresh = build_engine(DelegationSettings::default());
        assert_eq!(fresh.cleanup().await, 0);
    }

    #[tokio::test]
    async fn test_cleanup_settles_fresh_descendants_of_stale_ancestor() {
        let engine = build_engine(
            DelegationSettings::default().with_retention(Duration::from_millis(100)),
        );
        let outer = {
            let engine = engine.clone();
            tokio::spawn(async move {
                engine.delegate_work("coordinator", "lead", "Lead the work", "Summary").await
            })
        };
        wait_for_pending(&engine, 1).await;
        let lead = engine.contexts().get_agent_context("lead").await.unwrap();
        let inner = {
            let engine = engine.clone();
            tokio::spawn(async move {
                engine
                    .delegate_from_conversation(lead.conversation_id, "worker", "Do the part", "Result")
                    .await
            })
        };
        wait_for_pending(&engine, 2).await;
        let worker = engine.contexts().get_agent_context("worker").await.unwrap();

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(engine.update_conversation_activity(worker.conversation_id));

        assert_eq!(engine.cleanup().await, 1);
        let inner = tokio::time::timeout(Duration::from_secs(1), inner)
            .await
            .expect("descendant caller released");
        assert!(matches!(inner.unwrap(), Err(Error::Terminated { .. })));
        assert!(matches!(outer.await.unwrap(), Err(Error::Terminated { .. })));

        let record = engine.get_conversation(worker.conversation_id).unwrap();
        assert_eq!(record.status, ConversationStatus::Failed);
        assert!(engine.get_active_conversations().is_empty());
        assert_eq!(engine.contexts().get_active_agents().await, ["coordinator"]);
    }

    #[tokio::test]
    async fn test_shutdown_releases_callers() {
        let engine = build_engine(DelegationSettings::default());
        let waiter = {
            let engine = engine.clone();
            tokio::spawn(async move {
                engine.delegate_work("coordinator", "lead", "Lead this", "Summary").await
            })
        };
        wait_for_pending(&engine, 1).await;

        assert_eq!(engine.shutdown().await, 1);
        assert!(matches!(waiter.await.unwrap(), Err(Error::Terminated { .. })));
        assert!(engine.is_shut_down());
        assert!(engine.contexts().get_active_agents().await.is_empty());
        assert_eq!(engine.contexts().active_count().await, 0);
        let err = engine.delegate_work("coordinator", "lead", "x", "y").await.unwrap_err();
        assert!(err.message().contains("shut down"));
    }
}
