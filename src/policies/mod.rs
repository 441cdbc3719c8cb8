//! Restart policies used by the [`Watchdog`](crate::Watchdog).
//!
//! The supervisor task never restarts a process on its own. These knobs only
//! drive the optional reconciliation loop that reacts to unexpected exits.
//!
//! ## Contents
//! - [`RestartPolicy`] whether to restart after an exit (never / on-failure / always)
//! - [`BackoffPolicy`] how long to wait before relaunching (first / factor / max + jitter)
//! - [`JitterPolicy`]  randomization to keep a fleet of crashing instances from relaunching in lockstep
//!
//! ## Defaults
//! - `RestartPolicy::OnFailure`
//! - `BackoffPolicy::default()` → first=100ms, factor=1.0 (constant), max=30s, jitter=None.

mod backoff;
mod jitter;
mod restart;

pub use backoff::BackoffPolicy;
pub use jitter::JitterPolicy;
pub use restart::RestartPolicy;
