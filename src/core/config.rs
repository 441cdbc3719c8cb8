//! # Service-wide configuration.
//!
//! Provides [`Config`], the settings shared by a [`Service`](crate::Service),
//! its instances and any [`Watchdog`](crate::Watchdog) built from it.
//!
//! Config is used in three ways:
//! 1. **Service creation**: `Service::builder(name).with_config(config)`
//! 2. **Native backend**: `NativeBackend::new(config.stop_grace)` when no backend is given
//! 3. **Watchdog defaults**: `WatchdogParams::from_config(&config)`
//!
//! ## Sentinel values
//! - `max_restarts = 0` → unlimited consecutive restarts
//! - `grace = 0s` → shutdown does not wait at all

use std::time::Duration;

use crate::policies::{BackoffPolicy, RestartPolicy};

/// Configuration for a supervision service.
///
/// ## Field semantics
/// - `grace`: maximum wait for all instances to close on shutdown
/// - `stop_grace`: per-process wait between SIGTERM and the hard kill (native backend)
/// - `bus_capacity`: event bus ring buffer size (min 1; clamped by Bus)
/// - `restart`, `backoff`, `max_restarts`: watchdog defaults
///
/// ## Notes
/// All fields are public. Prefer the helper accessors over checking the `0`
/// sentinels inline.
#[derive(Clone, Debug)]
pub struct Config {
    /// Maximum time [`Service::shutdown`](crate::Service::shutdown) waits for instances.
    ///
    /// Instances still closing after `grace` are reported in
    /// `RuntimeError::GraceExceeded` and left to finish in the background.
    pub grace: Duration,

    /// Time a process gets to exit after SIGTERM before it is killed.
    pub stop_grace: Duration,

    /// Capacity of the event bus broadcast channel ring buffer.
    ///
    /// Receivers lagging more than `bus_capacity` events skip the oldest ones.
    pub bus_capacity: usize,

    /// Default restart policy for watchdogs.
    pub restart: RestartPolicy,

    /// Default backoff between watchdog relaunches.
    pub backoff: BackoffPolicy,

    /// Consecutive failed runs a watchdog tolerates before giving up.
    ///
    /// - `0` = unlimited
    /// - `n > 0` = the watchdog stops after `n` consecutive failures
    pub max_restarts: u32,
}

impl Config {
    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }

    /// Returns the restart limit as an `Option`.
    ///
    /// - `None` → unlimited
    /// - `Some(n)` → at most `n` consecutive failures
    #[inline]
    pub fn restart_limit(&self) -> Option<u32> {
        if self.max_restarts == 0 {
            None
        } else {
            Some(self.max_restarts)
        }
    }
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - `grace = 60s`
    /// - `stop_grace = 10s`
    /// - `bus_capacity = 1024`
    /// - `restart = RestartPolicy::OnFailure`
    /// - `backoff = BackoffPolicy::default()`
    /// - `max_restarts = 0` (unlimited)
    fn default() -> Self {
        Self {
            grace: Duration::from_secs(60),
            stop_grace: Duration::from_secs(10),
            bus_capacity: 1024,
            restart: RestartPolicy::default(),
            backoff: BackoffPolicy::default(),
            max_restarts: 0,
        }
    }
}
