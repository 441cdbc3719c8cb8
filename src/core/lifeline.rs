//! # Lifeline: one-shot "dying" signal with a recorded reason.
//!
//! Every [`Instance`](crate::Instance) owns one lifeline. Firing it means
//! "this instance is being shut down on purpose":
//!
//! ```text
//! Lifeline::new() ── alive
//!      │ fire(reason)       (first call wins, later calls are no-ops)
//!      ▼
//!   dying ── permanent, observable by any number of waiters
//! ```
//!
//! ## Rules
//! - Firing is idempotent; it never panics and never double-fires.
//! - The reason recorded is the one passed to the **first** `fire`.
//! - There is no way back: a dying lifeline stays dying.

use std::sync::Arc;
use std::sync::OnceLock;

use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

/// Shared one-shot cancellation signal plus termination reason.
#[derive(Clone, Debug, Default)]
pub(crate) struct Lifeline {
    token: CancellationToken,
    reason: Arc<OnceLock<Option<Arc<str>>>>,
}

impl Lifeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the lifeline dying. Returns true if this call did it.
    pub fn fire(&self, reason: Option<&str>) -> bool {
        let first = self.reason.set(reason.map(Arc::from)).is_ok();
        self.token.cancel();
        first
    }

    pub fn is_dying(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once the lifeline has fired.
    pub fn dying(&self) -> WaitForCancellationFuture<'_> {
        self.token.cancelled()
    }

    /// Child token cancelled together with this lifeline.
    pub fn child_token(&self) -> CancellationToken {
        self.token.child_token()
    }

    /// Reason given to the first `fire`, `None` if not dying or fired without one.
    pub fn reason(&self) -> Option<Arc<str>> {
        self.reason.get().cloned().flatten()
    }
}
