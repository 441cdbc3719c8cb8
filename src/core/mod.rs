//! Runtime core: instances, their supervision and the service registry.
//!
//! Public API from this module: [`Service`], [`Instance`], [`Exit`],
//! [`Watchdog`] and [`Config`].
//!
//! Internal modules:
//! - [`lifeline`]: one-shot "dying" signal shared by an instance and its supervisor;
//! - [`supervisor`]: the per-handle task that waits for the process and reports its exit;
//! - [`instance`]: launch with retry, restart rebinding, stop, close;
//! - [`service`]: name → instance registry, event listener, shutdown;
//! - [`watchdog`]: optional restart loop driven by the policies.

mod config;
mod instance;
mod lifeline;
mod service;
mod supervisor;
mod watchdog;

pub use config::Config;
pub use instance::Instance;
pub use service::{Service, ServiceBuilder};
pub use supervisor::Exit;
pub use watchdog::{Watchdog, WatchdogExit, WatchdogParams};
