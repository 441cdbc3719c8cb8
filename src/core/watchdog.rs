//! # Watchdog: restart reconciliation for one instance.
//!
//! The supervisor only reports exits. A [`Watchdog`] is the optional loop that
//! reacts to them with a [`RestartPolicy`] and a [`BackoffPolicy`].
//!
//! ## Flow
//! ```text
//! loop {
//!   wait for Exit{expected: false}   (or cancel / instance dying → return)
//!   ├─► RestartPolicy
//!   │     ├─ Never                 → return PolicyDeclined
//!   │     ├─ OnFailure, clean exit → return PolicyDeclined
//!   │     └─ otherwise             → schedule
//!   └─► loop {
//!         limit reached?  → publish WatchdogExhausted, return Exhausted
//!         publish RestartScheduled → sleep(delay) → instance.restart()
//!           ├─ Ok      → back to waiting
//!           ├─ Closed  → return InstanceDying
//!           └─ Err     → failures += 1, delay = backoff.next(failures)
//!       }
//! }
//! ```
//!
//! ## Rules
//! - `failures` counts consecutive failed runs and failed relaunches.
//! - A clean exit, or a run that stayed up for at least `backoff.max`,
//!   resets `failures`.
//! - The `attempt` carried by `RestartScheduled` is the total number of
//!   relaunches scheduled by this watchdog (monotonic).

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::config::Config;
use super::instance::Instance;
use super::supervisor::Exit;
use crate::error::InstanceError;
use crate::events::EventKind;
use crate::policies::{BackoffPolicy, RestartPolicy};

/// Watchdog settings.
#[derive(Clone, Copy, Debug)]
pub struct WatchdogParams {
    /// When to relaunch.
    pub restart: RestartPolicy,
    /// How long to wait before relaunching after a failure.
    pub backoff: BackoffPolicy,
    /// Consecutive failures tolerated (`0` = unlimited).
    pub max_restarts: u32,
}

impl WatchdogParams {
    pub fn new(restart: RestartPolicy, backoff: BackoffPolicy) -> Self {
        Self {
            restart,
            backoff,
            max_restarts: 0,
        }
    }

    pub fn with_max_restarts(mut self, max_restarts: u32) -> Self {
        self.max_restarts = max_restarts;
        self
    }

    /// Takes `restart`, `backoff` and `max_restarts` from a service config.
    pub fn from_config(cfg: &Config) -> Self {
        Self::new(cfg.restart, cfg.backoff).with_max_restarts(cfg.max_restarts)
    }

    fn limit(&self) -> Option<u32> {
        (self.max_restarts > 0).then_some(self.max_restarts)
    }
}

impl Default for WatchdogParams {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Why a watchdog loop ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WatchdogExit {
    /// [`Watchdog::cancel`] was called.
    Cancelled,
    /// The instance was stopped or closed.
    InstanceDying,
    /// The restart policy does not relaunch after the last exit.
    PolicyDeclined,
    /// `max_restarts` consecutive failures.
    Exhausted,
    /// The watchdog task itself panicked.
    Panicked,
}

/// Handle to a running watchdog task.
#[derive(Debug)]
pub struct Watchdog {
    cancel: CancellationToken,
    join: JoinHandle<WatchdogExit>,
}

impl Watchdog {
    /// Watches `instance` with the given policies and no restart limit.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(instance: Arc<Instance>, restart: RestartPolicy, backoff: BackoffPolicy) -> Self {
        Self::spawn_with(instance, WatchdogParams::new(restart, backoff))
    }

    /// Watches `instance` with full [`WatchdogParams`].
    pub fn spawn_with(instance: Arc<Instance>, params: WatchdogParams) -> Self {
        let cancel = CancellationToken::new();
        let span = tracing::info_span!(
            "watchdog",
            service = %instance.service(),
            instance = %instance.name()
        );
        // subscribe before returning so no exit after `spawn` can be missed;
        // an exit already recorded is looked at once
        let mut exits = instance.subscribe_exits();
        exits.mark_changed();
        let join = tokio::spawn(run(instance, exits, params, cancel.clone()).instrument(span));
        Self { cancel, join }
    }

    /// Stops the loop. Does not touch the instance.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Waits for the loop to end.
    pub async fn join(self) -> WatchdogExit {
        self.join.await.unwrap_or(WatchdogExit::Panicked)
    }
}

async fn run(
    inst: Arc<Instance>,
    mut exits: watch::Receiver<Option<Exit>>,
    p: WatchdogParams,
    cancel: CancellationToken,
) -> WatchdogExit {
    let mut failures: u32 = 0;
    let mut scheduled: u32 = 0;
    let mut up_since = Instant::now();

    loop {
        let exit = tokio::select! {
            biased;
            _ = cancel.cancelled() => return WatchdogExit::Cancelled,
            _ = inst.dying() => return WatchdogExit::InstanceDying,
            changed = exits.changed() => {
                if changed.is_err() {
                    return WatchdogExit::InstanceDying;
                }
                let latest = exits.borrow_and_update().clone();
                match latest {
                    Some(exit) if !exit.expected => exit,
                    _ => continue,
                }
            }
        };
        // someone else already relaunched it
        if exit.generation < inst.generation().await {
            continue;
        }

        if up_since.elapsed() >= p.backoff.max {
            failures = 0;
        }
        let failed = !exit.is_clean();
        if !p.restart.should_restart(failed) {
            tracing::debug!(failed, "restart policy declined");
            return WatchdogExit::PolicyDeclined;
        }

        let mut delay = if failed {
            let d = p.backoff.next(failures);
            failures += 1;
            d
        } else {
            failures = 0;
            p.restart.clean_exit_delay().unwrap_or(Duration::ZERO)
        };
        let reason: Option<Arc<str>> = exit.error.as_ref().map(|e| Arc::from(e.to_string()));

        loop {
            if p.limit().is_some_and(|limit| failures > limit) {
                tracing::warn!(failures, "watchdog gave up restarting");
                inst.publish(inst.event(EventKind::WatchdogExhausted).with_attempt(failures));
                return WatchdogExit::Exhausted;
            }

            scheduled += 1;
            let mut ev = inst
                .event(EventKind::RestartScheduled)
                .with_attempt(scheduled)
                .with_delay(delay);
            if let Some(reason) = &reason {
                ev = ev.with_reason(reason.clone());
            }
            inst.publish(ev);
            tracing::info!(attempt = scheduled, ?delay, "restart scheduled");

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return WatchdogExit::Cancelled,
                _ = inst.dying() => return WatchdogExit::InstanceDying,
                _ = time::sleep(delay) => {}
            }

            match inst.restart().await {
                Ok(()) => {
                    up_since = Instant::now();
                    break;
                }
                Err(InstanceError::Closed { .. }) => return WatchdogExit::InstanceDying,
                Err(err) => {
                    tracing::warn!(error = %err, "watchdog restart failed");
                    delay = p.backoff.next(failures);
                    failures += 1;
                }
            }
        }
    }
}
