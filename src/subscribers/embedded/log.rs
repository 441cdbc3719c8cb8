//! # LogWriter: event renderer
//!
//! A minimal subscriber that renders incoming [`Event`]s through `tracing`.
//!
//! ## Example output (fmt layer)
//! ```text
//! INFO procvisor::log: [starting] service="web" instance="web-1" attempt=1
//! WARN procvisor::log: [start-failed] service="web" instance="web-1" attempt=1 err="No such file or directory"
//! INFO procvisor::log: [started] service="web" instance="web-1" pid=4242
//! WARN procvisor::log: [exited] service="web" instance="web-1" pid=4242 err="exited with code 1"
//! INFO procvisor::log: [restart-scheduled] instance="web-1" delay_ms=100 attempt=1
//! ```

use async_trait::async_trait;

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let label = e.kind.as_label();
        let service = e.service.as_deref().unwrap_or("");
        let instance = e.instance.as_deref().unwrap_or("");
        let err = e.reason.as_deref().unwrap_or("");

        match e.kind {
            EventKind::StartFailed
            | EventKind::InstanceExited
            | EventKind::RestartFailed
            | EventKind::GraceExceeded
            | EventKind::WatchdogExhausted
            | EventKind::SubscriberPanicked => {
                tracing::warn!(
                    target: "procvisor::log",
                    service, instance, pid = ?e.pid, attempt = ?e.attempt, err,
                    "[{label}]"
                );
            }
            EventKind::StopFailed | EventKind::SubscriberOverflow => {
                tracing::debug!(
                    target: "procvisor::log",
                    service, instance, pid = ?e.pid, err,
                    "[{label}]"
                );
            }
            EventKind::RestartScheduled => {
                tracing::info!(
                    target: "procvisor::log",
                    service, instance, delay_ms = ?e.delay_ms, attempt = ?e.attempt, err,
                    "[{label}]"
                );
            }
            _ => {
                tracing::info!(
                    target: "procvisor::log",
                    service, instance, pid = ?e.pid, attempt = ?e.attempt,
                    "[{label}]"
                );
            }
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}
