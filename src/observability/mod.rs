//! Observability for the delegation core.
//!
//! - **Error reporting**: [`ErrorReporter`] is the single sink every subsystem
//!   reports into; it logs through `tracing` and keeps a bounded history.
//! - **Metrics**: [`DelegationMetrics`] counts delegations by outcome and by
//!   target agent.
//! - **Spans**: structured spans around delegation, dispatch and report-out.
//!
//! Hosts that do not install their own subscriber can enable the
//! `subscriber` feature and call [`init_tracing`]:
//!
//! ```toml
//! agent-delegation = { version = "0.1", features = ["subscriber"] }
//! ```

mod metrics;
mod reporter;
mod spans;

pub use metrics::{
    AgentMetrics, Counter, DelegationMetrics, DelegationOutcome, Gauge, Histogram,
    MetricsSnapshot,
};
pub use reporter::{ErrorRecord, ErrorReporter};
pub use spans::{DelegationSpan, dispatch_span, report_span};

/// Installs a `fmt` subscriber filtered by `RUST_LOG` (default `info`).
#[cfg(feature = "subscriber")]
#[cfg_attr(docsrs, doc(cfg(feature = "subscriber")))]
pub fn init_tracing() -> Result<(), tracing_subscriber::util::TryInitError> {
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
}
