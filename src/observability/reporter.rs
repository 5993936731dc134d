//! Explicitly constructed error sink shared by every subsystem.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, warn};

use crate::config::DelegationSettings;
use crate::{Error, ErrorKind};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorRecord {
    pub kind: ErrorKind,
    pub message: String,
    pub agent: Option<String>,
    pub at: DateTime<Utc>,
}

/// Logs errors at a level chosen by kind and keeps a bounded history.
///
/// Created once at startup and passed as `Arc<ErrorReporter>`. After
/// [`dispose`](Self::dispose) it still logs but stops recording.
#[derive(Debug)]
pub struct ErrorReporter {
    history: Mutex<VecDeque<ErrorRecord>>,
    capacity: usize,
    disposed: AtomicBool,
}

impl ErrorReporter {
    pub fn new(capacity: usize) -> Self {
        Self {
            history: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity,
            disposed: AtomicBool::new(false),
        }
    }

    pub fn shared(capacity: usize) -> Arc<Self> {
        Arc::new(Self::new(capacity))
    }

    /// Shared reporter sized by `settings.max_error_history`.
    pub fn from_settings(settings: &DelegationSettings) -> Arc<Self> {
        Self::shared(settings.max_error_history)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn report(&self, err: &Error) {
        self.record(err.kind(), err.message(), err.agent().map(str::to_string));
    }

    pub fn record(&self, kind: ErrorKind, message: impl Into<String>, agent: Option<String>) {
        let message = message.into();
        let who = agent.as_deref().unwrap_or("-");
        match kind {
            ErrorKind::Cancelled => debug!(agent = who, %kind, "{}", message),
            ErrorKind::AgentExecution => error!(agent = who, %kind, "{}", message),
            ErrorKind::Configuration
            | ErrorKind::Delegation
            | ErrorKind::ToolAccess
            | ErrorKind::CircularDelegation => warn!(agent = who, %kind, "{}", message),
        }

        if self.is_disposed() || self.capacity == 0 {
            return;
        }

        let mut history = self.history.lock().unwrap_or_else(|e| e.into_inner());
        if history.len() == self.capacity {
            history.pop_front();
        }
        history.push_back(ErrorRecord {
            kind,
            message,
            agent,
            at: Utc::now(),
        });
    }

    /// Up to `limit` records, newest last.
    pub fn recent(&self, limit: usize) -> Vec<ErrorRecord> {
        let history = self.history.lock().unwrap_or_else(|e| e.into_inner());
        let skip = history.len().saturating_sub(limit);
        history.iter().skip(skip).cloned().collect()
    }

    pub fn count_by_kind(&self, kind: ErrorKind) -> usize {
        self.history
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|r| r.kind == kind)
            .count()
    }

    pub fn len(&self) -> usize {
        self.history.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.history
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    /// Drops the history and stops recording.
    pub fn dispose(&self) {
        self.disposed.store(true, Ordering::Release);
        self.clear();
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }
}

impl Default for ErrorReporter {
    fn default() -> Self {
        Self::new(crate::config::settings::DEFAULT_MAX_ERROR_HISTORY)
    }
}
