//! # Restart policies for supervised instances.
//!
//! [`RestartPolicy`] decides whether an instance whose process exited on its own
//! should be relaunched.
//!
//! ```text
//! exit status     Never   OnFailure   Always{interval}
//! ----------------------------------------------------
//! clean (code 0)  stop    stop        restart after `interval`
//! failed          stop    restart     restart (backoff)
//! ```

use std::time::Duration;

/// Policy controlling whether an instance is relaunched after an unexpected exit.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RestartPolicy {
    /// Never relaunch.
    Never,
    /// Relaunch only when the process ended with an error (default).
    #[default]
    OnFailure,
    /// Relaunch after every exit.
    ///   - `interval`: delay after a *clean* exit (`None` → immediately).
    ///     Failed exits use the backoff policy instead.
    Always { interval: Option<Duration> },
}

impl RestartPolicy {
    /// Returns true if an exit with the given outcome should lead to a relaunch.
    pub fn should_restart(&self, failed: bool) -> bool {
        match self {
            RestartPolicy::Never => false,
            RestartPolicy::OnFailure => failed,
            RestartPolicy::Always { .. } => true,
        }
    }

    /// Delay before relaunching after a clean exit, if this policy relaunches at all.
    pub fn clean_exit_delay(&self) -> Option<Duration> {
        match self {
            RestartPolicy::Always { interval } => Some(interval.unwrap_or(Duration::ZERO)),
            _ => None,
        }
    }
}
