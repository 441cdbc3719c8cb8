//! # Backend contract.
//!
//! A [`Backend`] is the only place where processes are actually created,
//! signalled, reaped and measured. Instances hold an `Arc<dyn Backend>` so
//! the execution environment can be swapped without touching lifecycle code.

use std::sync::Arc;

use async_trait::async_trait;

use super::{PartialStats, ProcessHandle};
use crate::error::BackendError;
use crate::process::ProcessConfig;

/// Shared handle to a backend.
pub type BackendRef = Arc<dyn Backend>;

/// Process-launch primitive consumed by instances.
///
/// # Example
/// ```
/// use async_trait::async_trait;
/// use procvisor::{Backend, BackendError, PartialStats, ProcessConfig, ProcessHandle};
///
/// /// Pretends every process exits cleanly at once.
/// struct Instant;
///
/// #[async_trait]
/// impl Backend for Instant {
///     fn name(&self) -> &str { "instant" }
///
///     async fn start(&self, _cfg: &ProcessConfig) -> Result<ProcessHandle, BackendError> {
///         Ok(ProcessHandle::new(1))
///     }
///     async fn stop(&self, _h: &ProcessHandle) -> Result<(), BackendError> { Ok(()) }
///     async fn wait(&self, _h: &ProcessHandle) -> Result<(), BackendError> { Ok(()) }
///     async fn stats(&self, _h: &ProcessHandle) -> PartialStats { PartialStats::new() }
/// }
/// ```
#[async_trait]
pub trait Backend: Send + Sync + 'static {
    /// Short backend name (for logs).
    fn name(&self) -> &str;

    /// Launches a new process. Not idempotent: every call is a new process.
    async fn start(&self, cfg: &ProcessConfig) -> Result<ProcessHandle, BackendError>;

    /// Requests termination. Best effort: an error does not imply the process
    /// is still running, and stopping an exited process is `Ok`.
    async fn stop(&self, handle: &ProcessHandle) -> Result<(), BackendError>;

    /// Resolves once the process has exited.
    ///
    /// `Ok(())` means a clean exit. Must be cancel-safe and may be called any
    /// number of times; every call observes the same outcome.
    async fn wait(&self, handle: &ProcessHandle) -> Result<(), BackendError>;

    /// Point-in-time resource snapshot. Lookup failures are reported inside
    /// the returned map, never as an error.
    async fn stats(&self, handle: &ProcessHandle) -> PartialStats;
}
