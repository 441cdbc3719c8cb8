//! # Supervisor task: watches one process handle.
//!
//! One supervisor runs per bound handle. It never restarts anything; it only
//! reconciles "the process exited" with "somebody asked it to".
//!
//! ## Flow
//! ```text
//! spawn_on(rt, ctx) ──► supervise():
//!
//! select! {
//!   stop.cancelled()      (lifeline fired, or Restart handing over)
//!       └─► exit quietly; if wait already resolved, record Exit{expected}
//!   backend.wait(handle)  (catch_unwind: a panic becomes BackendError::Panicked)
//!       ├─ lifeline fired meanwhile ─► record Exit{expected}, Ok
//!       └─ otherwise ─► record Exit{unexpected}, publish InstanceExited,
//!                       park until stop, then return the outcome
//! }
//! ```
//!
//! ## Rules
//! - The exit channel gets **at most one** `Exit` per generation, and never
//!   goes back to an older generation.
//! - After an unexpected exit the task stays parked (no work, no polling) so it
//!   is alive until the instance is closed or rebound, and its result is what
//!   [`Instance::close`](crate::Instance::close) returns.
//! - `wait` runs only here, never on the caller's task.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::SystemTime;

use futures::FutureExt;
use tokio::runtime::Handle as RuntimeHandle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::lifeline::Lifeline;
use crate::backend::{BackendRef, ProcessHandle};
use crate::error::{BackendError, InstanceError};
use crate::events::{Bus, Event, EventKind};

/// One observed process exit.
#[derive(Clone, Debug)]
pub struct Exit {
    /// Pid of the process that exited.
    pub pid: u32,
    /// Handle generation the exit belongs to (1 = first launch).
    pub generation: u64,
    /// When the supervisor observed it.
    pub at: SystemTime,
    /// `None` for a clean exit, otherwise the wait error.
    pub error: Option<Arc<BackendError>>,
    /// True if the instance was already dying (stop/close) when the exit was seen.
    pub expected: bool,
}

impl Exit {
    /// True for a clean (zero status) exit.
    pub fn is_clean(&self) -> bool {
        self.error.is_none()
    }
}

/// Everything a supervisor needs; moved into the task.
pub(crate) struct SupervisorCtx {
    pub service: Arc<str>,
    pub instance: Arc<str>,
    pub backend: BackendRef,
    pub handle: ProcessHandle,
    pub generation: u64,
    pub lifeline: Lifeline,
    pub exits: Arc<watch::Sender<Option<Exit>>>,
    pub bus: Bus,
    pub span: tracing::Span,
}

/// A running supervisor: its stop token and join handle.
pub(crate) struct Watch {
    stop: CancellationToken,
    join: JoinHandle<Result<(), InstanceError>>,
    outcome: Option<Result<(), InstanceError>>,
}

impl Watch {
    /// Asks this supervisor to let go of its handle without touching the lifeline.
    pub fn hand_over(&self) {
        self.stop.cancel();
    }

    /// True until the task has returned.
    pub fn is_running(&self) -> bool {
        !self.join.is_finished()
    }

    /// Rendezvous with the task. A panicked or aborted task becomes an error.
    ///
    /// Cancel safe: a dropped call leaves the task attached, and the next call
    /// keeps waiting on it. Once joined, the outcome is returned again.
    pub async fn join(&mut self, instance: &str) -> Result<(), InstanceError> {
        if let Some(outcome) = &self.outcome {
            return outcome.clone();
        }
        let outcome = match (&mut self.join).await {
            Ok(res) => res,
            Err(_) => Err(InstanceError::SupervisorPanicked {
                name: instance.to_string(),
            }),
        };
        self.outcome = Some(outcome.clone());
        outcome
    }
}

/// Resolves the runtime supervisors are spawned on.
///
/// This is the only fallible part of starting supervision, so callers check it
/// before they commit to anything.
pub(crate) fn runtime(instance: &str) -> Result<RuntimeHandle, InstanceError> {
    RuntimeHandle::try_current().map_err(|err| InstanceError::Spawn {
        name: instance.to_string(),
        reason: err.to_string(),
    })
}

/// Spawns the supervisor task on `rt`.
pub(crate) fn spawn_on(rt: &RuntimeHandle, ctx: SupervisorCtx) -> Watch {
    let stop = ctx.lifeline.child_token();
    let span = ctx.span.clone();
    let join = rt.spawn(supervise(ctx, stop.clone()).instrument(span));
    Watch {
        stop,
        join,
        outcome: None,
    }
}

async fn supervise(ctx: SupervisorCtx, stop: CancellationToken) -> Result<(), InstanceError> {
    let wait = AssertUnwindSafe(ctx.backend.wait(&ctx.handle)).catch_unwind();
    tokio::pin!(wait);

    let res = tokio::select! {
        biased;
        _ = stop.cancelled() => {
            if ctx.lifeline.is_dying() {
                if let Some(res) = wait.as_mut().now_or_never() {
                    let _ = ctx.record(flatten(res), true);
                }
                tracing::debug!("supervision ended: instance is dying");
            } else {
                tracing::debug!("supervision handed over");
            }
            return Ok(());
        }
        res = &mut wait => flatten(res),
    };

    if ctx.lifeline.is_dying() {
        return ctx.record(res, true);
    }

    let outcome = ctx.record(res, false);
    stop.cancelled().await;
    outcome
}

impl SupervisorCtx {
    /// Publishes the exit and turns it into the task result.
    fn record(&self, res: Result<(), BackendError>, expected: bool) -> Result<(), InstanceError> {
        let pid = self.handle.pid();
        let error = res.err().map(Arc::new);
        let exit = Exit {
            pid,
            generation: self.generation,
            at: SystemTime::now(),
            error: error.clone(),
            expected,
        };
        // a handed-over supervisor may finish after its successor reported
        self.exits.send_if_modified(|cur| {
            if cur.as_ref().is_some_and(|c| c.generation > exit.generation) {
                return false;
            }
            *cur = Some(exit);
            true
        });

        if expected {
            tracing::info!("instance stopped");
            return Ok(());
        }

        let mut ev = Event::new(EventKind::InstanceExited)
            .with_service(self.service.clone())
            .with_instance(self.instance.clone())
            .with_pid(pid);
        if let Some(err) = &error {
            ev = ev.with_reason(err.to_string());
        }
        self.bus.publish(ev);

        match error {
            None => {
                tracing::info!("instance exited on its own");
                Ok(())
            }
            Some(source) => {
                tracing::warn!(error = %source, "instance exited unexpectedly");
                Err(InstanceError::Exited {
                    name: self.instance.to_string(),
                    pid,
                    source,
                })
            }
        }
    }
}

fn flatten(
    res: Result<Result<(), BackendError>, Box<dyn std::any::Any + Send>>,
) -> Result<(), BackendError> {
    res.unwrap_or_else(|panic| {
        let info = panic
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        Err(BackendError::Panicked { info })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panics_become_backend_errors() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("wait exploded");
        let err = flatten(Err(payload)).unwrap_err();
        assert!(matches!(err, BackendError::Panicked { ref info } if info == "wait exploded"));

        let owned: Box<dyn std::any::Any + Send> = Box::new(String::from("owned"));
        assert_eq!(flatten(Err(owned)).unwrap_err().as_label(), "backend_panicked");

        assert!(flatten(Ok(Ok(()))).is_ok());
    }
}
