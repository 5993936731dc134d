//! Runtime settings for the delegation engine.

use std::time::Duration;

use super::env::EnvConfigProvider;
use super::{ConfigError, ConfigResult};

pub const ENV_PREFIX: &str = "AGENT_DELEGATION_";

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(30 * 60);
pub const DEFAULT_MAX_ERROR_HISTORY: usize = 100;
/// Shortest period the background cleanup loop will run at.
pub const MIN_CLEANUP_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelegationSettings {
    /// How long `delegate_work` waits for a report.
    pub timeout: Duration,
    /// Period of the background cleanup task.
    pub cleanup_interval: Duration,
    /// Conversation records idle longer than this are pruned.
    pub retention: Duration,
    /// Start the delegate on the agent backend when work is delegated.
    pub dispatch_on_delegate: bool,
    /// Capacity of the error history kept by [`ErrorReporter::from_settings`](crate::ErrorReporter::from_settings).
    pub max_error_history: usize,
}

impl Default for DelegationSettings {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            cleanup_interval: DEFAULT_CLEANUP_INTERVAL,
            retention: DEFAULT_RETENTION,
            dispatch_on_delegate: true,
            max_error_history: DEFAULT_MAX_ERROR_HISTORY,
        }
    }
}

impl DelegationSettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by `AGENT_DELEGATION_*` variables.
    pub fn from_env() -> ConfigResult<Self> {
        Self::default().with_env(&EnvConfigProvider::prefixed(ENV_PREFIX))
    }

    pub fn with_env(mut self, env: &EnvConfigProvider) -> ConfigResult<Self> {
        if let Some(secs) = env.get::<u64>("timeout.secs")? {
            self.timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = env.get::<u64>("cleanup.interval.secs")? {
            if secs == 0 {
                return Err(ConfigError::InvalidValue {
                    key: env.env_key("cleanup.interval.secs"),
                    message: "cleanup interval must be at least one second".into(),
                });
            }
            self.cleanup_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = env.get::<u64>("retention.secs")? {
            self.retention = Duration::from_secs(secs);
        }
        if let Some(dispatch) = env.get::<bool>("dispatch")? {
            self.dispatch_on_delegate = dispatch;
        }
        if let Some(max) = env.get::<usize>("max.error.history")? {
            self.max_error_history = max;
        }
        Ok(self)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Intervals shorter than [`MIN_CLEANUP_INTERVAL`] are raised to it.
    pub fn with_cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval.max(MIN_CLEANUP_INTERVAL);
        self
    }

    pub fn with_max_error_history(mut self, max: usize) -> Self {
        self.max_error_history = max;
        self
    }

    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    pub fn with_dispatch(mut self, dispatch: bool) -> Self {
        self.dispatch_on_delegate = dispatch;
        self
    }
}
