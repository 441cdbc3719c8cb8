//! Error types used by the procvisor engine and its backends.
//!
//! This module defines three error enums:
//!
//! - [`BackendError`] failures reported by an execution [`Backend`](crate::Backend).
//! - [`InstanceError`] failures of instance creation, supervision and control.
//! - [`RuntimeError`] errors raised by service-wide orchestration (shutdown).
//!
//! All of them provide `as_label` for logs/metrics.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

/// # Errors produced by an execution backend.
///
/// `ExitCode` and `Signaled` are not launch failures: they are what
/// [`Backend::wait`](crate::Backend::wait) returns for a process that ended badly.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum BackendError {
    /// The process could not be launched.
    #[error("failed to spawn {program:?}: {source}")]
    Spawn {
        /// Program that was being launched.
        program: String,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },

    /// Delivering a signal to the process failed.
    #[error("failed to signal pid {pid}: {source}")]
    Signal {
        /// Target process id.
        pid: u32,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },

    /// Process exited with a non-zero code.
    #[error("exited with code {code}")]
    ExitCode {
        /// Exit code reported by the OS.
        code: i32,
    },

    /// Process was terminated by a signal.
    #[error("terminated by signal {signal}")]
    Signaled {
        /// Signal number.
        signal: i32,
    },

    /// The handle does not belong to this backend (or was never started).
    #[error("unknown process handle #{id}")]
    UnknownHandle {
        /// Backend-assigned handle id.
        id: u64,
    },

    /// Backend code panicked while serving a call.
    #[error("backend panicked: {info}")]
    Panicked {
        /// Panic payload rendered as text.
        info: String,
    },

    /// Any other I/O failure.
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl BackendError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use procvisor::BackendError;
    ///
    /// let err = BackendError::ExitCode { code: 2 };
    /// assert_eq!(err.as_label(), "backend_exit_code");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            BackendError::Spawn { .. } => "backend_spawn",
            BackendError::Signal { .. } => "backend_signal",
            BackendError::ExitCode { .. } => "backend_exit_code",
            BackendError::Signaled { .. } => "backend_signaled",
            BackendError::UnknownHandle { .. } => "backend_unknown_handle",
            BackendError::Panicked { .. } => "backend_panicked",
            BackendError::Io(_) => "backend_io",
        }
    }

    /// True if this error describes how a process ended rather than a backend fault.
    pub fn is_exit(&self) -> bool {
        matches!(
            self,
            BackendError::ExitCode { .. } | BackendError::Signaled { .. }
        )
    }
}

/// # Errors produced by instance lifecycle operations.
///
/// Cheap to clone: backend causes are shared behind an `Arc`, so the same
/// supervision outcome can be handed to every caller of
/// [`Instance::close`](crate::Instance::close).
#[non_exhaustive]
#[derive(Error, Debug, Clone)]
pub enum InstanceError {
    /// Both launch attempts failed; no instance was created.
    #[error("instance {name:?} failed to start: {source}")]
    Start {
        /// Instance name.
        name: String,
        /// Error of the last attempt.
        #[source]
        source: Arc<BackendError>,
    },

    /// Relaunch failed; the instance still references its previous handle.
    #[error("instance {name:?} failed to restart: {source}")]
    Restart {
        /// Instance name.
        name: String,
        /// Backend failure.
        #[source]
        source: Arc<BackendError>,
    },

    /// The supervisor task could not be spawned.
    #[error("instance {name:?} could not spawn its supervisor: {reason}")]
    Spawn {
        /// Instance name.
        name: String,
        /// Why spawning failed.
        reason: String,
    },

    /// The process ended without anybody asking it to.
    #[error("instance {name:?} (pid {pid}) exited unexpectedly: {source}")]
    Exited {
        /// Instance name.
        name: String,
        /// Pid of the process that exited.
        pid: u32,
        /// Wait outcome.
        #[source]
        source: Arc<BackendError>,
    },

    /// An instance with this name is already registered.
    #[error("instance {name:?} already exists")]
    AlreadyExists {
        /// Instance name.
        name: String,
    },

    /// No instance with this name is registered.
    #[error("instance {name:?} not found")]
    NotFound {
        /// Instance name.
        name: String,
    },

    /// The instance has been asked to die; it accepts no further restarts.
    #[error("instance {name:?} is closed")]
    Closed {
        /// Instance name.
        name: String,
    },

    /// The supervisor task panicked or was aborted.
    #[error("supervisor of instance {name:?} panicked")]
    SupervisorPanicked {
        /// Instance name.
        name: String,
    },
}

impl InstanceError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use procvisor::InstanceError;
    ///
    /// let err = InstanceError::NotFound { name: "web".into() };
    /// assert_eq!(err.as_label(), "instance_not_found");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            InstanceError::Start { .. } => "instance_start",
            InstanceError::Restart { .. } => "instance_restart",
            InstanceError::Spawn { .. } => "instance_spawn",
            InstanceError::Exited { .. } => "instance_exited",
            InstanceError::AlreadyExists { .. } => "instance_already_exists",
            InstanceError::NotFound { .. } => "instance_not_found",
            InstanceError::Closed { .. } => "instance_closed",
            InstanceError::SupervisorPanicked { .. } => "instance_supervisor_panicked",
        }
    }

    /// Name of the instance the error refers to.
    pub fn instance(&self) -> &str {
        match self {
            InstanceError::Start { name, .. }
            | InstanceError::Restart { name, .. }
            | InstanceError::Spawn { name, .. }
            | InstanceError::Exited { name, .. }
            | InstanceError::AlreadyExists { name }
            | InstanceError::NotFound { name }
            | InstanceError::Closed { name }
            | InstanceError::SupervisorPanicked { name } => name,
        }
    }
}

/// # Errors produced by service-wide orchestration.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Shutdown grace period was exceeded; some instances did not close in time.
    #[error("shutdown timeout {grace:?} exceeded; stuck: {stuck:?}")]
    GraceExceeded {
        /// The configured grace duration.
        grace: Duration,
        /// Names of instances that did not close in time.
        stuck: Vec<String>,
    },
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use procvisor::RuntimeError;
    /// use std::time::Duration;
    ///
    /// let err = RuntimeError::GraceExceeded { grace: Duration::from_secs(5), stuck: vec![] };
    /// assert_eq!(err.as_label(), "runtime_grace_exceeded");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::GraceExceeded { .. } => "runtime_grace_exceeded",
        }
    }
}
