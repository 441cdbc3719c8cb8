//! # Lifecycle events emitted by services, instances and watchdogs.
//!
//! The [`EventKind`] enum classifies event types across four categories:
//! - **Instance lifecycle**: launch, exit, restart, stop, close
//! - **Reconciliation**: watchdog restart scheduling and exhaustion
//! - **Shutdown**: service-wide teardown
//! - **Subscriber health**: overflow and panics in event consumers
//!
//! The [`Event`] struct carries additional metadata such as timestamps,
//! service and instance names, pid, attempt and reasons.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//!
//! ## Example
//! ```rust
//! use procvisor::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::StartFailed)
//!     .with_service("web")
//!     .with_instance("web-1")
//!     .with_attempt(2)
//!     .with_reason("No such file or directory");
//!
//! assert_eq!(ev.kind, EventKind::StartFailed);
//! assert_eq!(ev.instance.as_deref(), Some("web-1"));
//! assert_eq!(ev.attempt, Some(2));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of lifecycle events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets `reason` (subscriber name and panic info).
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets `reason` (subscriber name and `full`/`closed`).
    SubscriberOverflow,

    // === Shutdown events ===
    /// Service shutdown requested.
    ShutdownRequested,

    /// All instances closed within the configured grace period.
    AllStoppedWithin,

    /// Grace period exceeded; some instances did not close in time.
    GraceExceeded,

    // === Instance lifecycle ===
    /// A launch attempt is about to be made.
    ///
    /// Sets `instance`, `attempt` (1 or 2).
    InstanceStarting,

    /// A launch attempt failed.
    ///
    /// Sets `instance`, `attempt`, `reason`.
    StartFailed,

    /// Instance is running and supervised.
    ///
    /// Sets `instance`, `pid`.
    InstanceStarted,

    /// The process exited without a stop/close request.
    ///
    /// Sets `instance`, `pid`, `reason` (absent for a clean exit).
    InstanceExited,

    /// Instance was relaunched and rebound to a new handle.
    ///
    /// Sets `instance`, `pid` (the new one).
    InstanceRestarted,

    /// Relaunch failed; the old handle is kept.
    ///
    /// Sets `instance`, `pid` (the old one), `reason`.
    RestartFailed,

    /// Stop was requested.
    ///
    /// Sets `instance`, `pid`.
    InstanceStopping,

    /// The backend failed to stop the process (non-fatal).
    ///
    /// Sets `instance`, `pid`, `reason`.
    StopFailed,

    /// Instance left the service registry.
    ///
    /// Sets `instance`.
    InstanceRemoved,

    /// Supervisor joined; no more activity for this instance.
    ///
    /// Sets `instance`, `reason` (if supervision ended with an error).
    InstanceClosed,

    // === Reconciliation ===
    /// Watchdog scheduled a restart.
    ///
    /// Sets `instance`, `attempt`, `delay_ms`, `reason` (last exit error).
    RestartScheduled,

    /// Watchdog gave up restarting.
    ///
    /// Sets `instance`, `attempt`.
    WatchdogExhausted,
}

impl EventKind {
    /// Short stable label for logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            EventKind::SubscriberPanicked => "subscriber-panicked",
            EventKind::SubscriberOverflow => "subscriber-overflow",
            EventKind::ShutdownRequested => "shutdown-requested",
            EventKind::AllStoppedWithin => "all-stopped-within-grace",
            EventKind::GraceExceeded => "grace-exceeded",
            EventKind::InstanceStarting => "starting",
            EventKind::StartFailed => "start-failed",
            EventKind::InstanceStarted => "started",
            EventKind::InstanceExited => "exited",
            EventKind::InstanceRestarted => "restarted",
            EventKind::RestartFailed => "restart-failed",
            EventKind::InstanceStopping => "stopping",
            EventKind::StopFailed => "stop-failed",
            EventKind::InstanceRemoved => "removed",
            EventKind::InstanceClosed => "closed",
            EventKind::RestartScheduled => "restart-scheduled",
            EventKind::WatchdogExhausted => "watchdog-exhausted",
        }
    }
}

/// Lifecycle event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,
    /// Owning service name.
    pub service: Option<Arc<str>>,
    /// Instance name.
    pub instance: Option<Arc<str>>,
    /// Process id the event refers to.
    pub pid: Option<u32>,
    /// Attempt count (starting from 1).
    pub attempt: Option<u32>,
    /// Delay before the next restart in milliseconds (compact).
    pub delay_ms: Option<u32>,
    /// Human-readable reason (errors, overflow details, etc.).
    pub reason: Option<Arc<str>>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            service: None,
            instance: None,
            pid: None,
            attempt: None,
            delay_ms: None,
            reason: None,
        }
    }

    /// Attaches the owning service name.
    #[inline]
    pub fn with_service(mut self, service: impl Into<Arc<str>>) -> Self {
        self.service = Some(service.into());
        self
    }

    /// Attaches an instance name.
    #[inline]
    pub fn with_instance(mut self, instance: impl Into<Arc<str>>) -> Self {
        self.instance = Some(instance.into());
        self
    }

    /// Attaches a process id.
    #[inline]
    pub fn with_pid(mut self, pid: u32) -> Self {
        self.pid = Some(pid);
        self
    }

    /// Attaches an attempt count.
    #[inline]
    pub fn with_attempt(mut self, n: u32) -> Self {
        self.attempt = Some(n);
        self
    }

    /// Attaches a restart delay (stored as milliseconds).
    #[inline]
    pub fn with_delay(mut self, d: Duration) -> Self {
        let ms = d.as_millis().min(u128::from(u32::MAX)) as u32;
        self.delay_ms = Some(ms);
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_reason(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_reason(format!("subscriber={subscriber} info={info}"))
    }
}
