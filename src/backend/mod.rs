//! # Execution backends.
//!
//! The engine never touches OS processes directly. It goes through a
//! [`Backend`], which offers four primitives:
//!
//! ```text
//! start(config) ──► ProcessHandle
//! stop(handle)       best-effort termination
//! wait(handle)       resolves on exit (Ok = clean exit)
//! stats(handle) ──► PartialStats (never fails, degrades instead)
//! ```
//!
//! - [`NativeBackend`]: local OS processes via `tokio::process`.
//! - Anything else (containers, sandboxes, test fakes) implements [`Backend`].

mod backend;
mod handle;
mod native;
pub(crate) mod procfs;
mod stats;

pub use backend::{Backend, BackendRef};
pub use handle::ProcessHandle;
pub use native::NativeBackend;
pub use stats::{KEY_ERROR, KEY_NAME, KEY_PROCESS, PartialStats};
