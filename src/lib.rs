//! # procvisor
//!
//! **Procvisor** supervises OS processes from async Rust.
//!
//! It launches named processes through a pluggable execution backend, keeps
//! one supervisor task per live process, distinguishes crashes from requested
//! shutdowns, and reports identity and resource telemetry upward. Restart
//! decisions are left to the caller or to an optional [`Watchdog`].
//!
//! ## Architecture
//! ### Overview
//! ```text
//!     ┌──────────────────┐  ┌──────────────────┐  ┌──────────────────┐
//!     │  ProcessConfig   │  │  ProcessConfig   │  │  ProcessConfig   │
//!     │ ("web", sleep..) │  │ ("db", ...)      │  │ ("worker", ...)  │
//!     └────────┬─────────┘  └────────┬─────────┘  └────────┬─────────┘
//!              ▼                     ▼                     ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Service (registry)                                               │
//! │  - name → Instance map                                            │
//! │  - Backend (NativeBackend or your own)                            │
//! │  - Bus (broadcast events) ──► listener ──► SubscriberSet          │
//! └──────┬─────────────────────┬─────────────────────┬────────────────┘
//!        ▼                     ▼                     ▼
//!  ┌─────────────┐       ┌─────────────┐       ┌─────────────┐
//!  │  Instance   │       │  Instance   │       │  Instance   │  ◄── Watchdog (optional)
//!  │  handle +   │       │  handle +   │       │  handle +   │      restart policy
//!  │  lifeline   │       │  lifeline   │       │  lifeline   │      + backoff
//!  └──────┬──────┘       └──────┬──────┘       └──────┬──────┘
//!         ▼                     ▼                     ▼
//!   supervisor task       supervisor task       supervisor task
//!   select! {             (one per bound        (one per bound
//!     backend.wait(h),     handle)               handle)
//!     dying / handover
//!   }
//! ```
//!
//! ### Lifecycle
//! ```text
//! Service::new_instance(name, cfg)
//!   ├─► backend.start(cfg)  (retried once)
//!   ├─► spawn supervisor ─► InstanceStarted
//!   │
//!   ├─ process exits on its own ─► Exit{expected: false} + InstanceExited
//!   ├─ Instance::restart()       ─► new handle, old supervisor handed over, new supervisor
//!   ├─ Instance::stop()          ─► dying, backend.stop, leaves the registry
//!   └─ Instance::close()         ─► dying, supervisor joined (result cached)
//! ```
//!
//! ## Features
//! | Area              | Description                                                | Key types / traits                        |
//! |-------------------|------------------------------------------------------------|-------------------------------------------|
//! | **Backends**      | How processes are started, stopped, awaited and measured.  | [`Backend`], [`NativeBackend`]            |
//! | **Supervision**   | Named instances, exit reporting, restart rebinding.        | [`Service`], [`Instance`], [`Exit`]       |
//! | **Reconciliation**| Optional restart loop with backoff and a restart limit.    | [`Watchdog`], [`RestartPolicy`]           |
//! | **Telemetry**     | Additive identity and resource snapshots.                  | [`PartialStats`]                          |
//! | **Subscriber API**| Hook into lifecycle events.                                | [`Subscribe`], [`Event`]                  |
//! | **Errors**        | Typed errors with stable labels.                           | [`BackendError`], [`InstanceError`]       |
//! | **Configuration** | Service-wide settings.                                     | [`Config`]                                |
//!
//! ## Optional features
//! - `logging`: exports a simple built-in [`LogWriter`] that renders events through `tracing`.
//!
//! ## Example
//! ```no_run
//! use std::sync::Arc;
//! use procvisor::{Config, NativeBackend, ProcessConfig, Service};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cfg = Config::default();
//!     let backend = Arc::new(NativeBackend::new(cfg.stop_grace));
//!     let service = Service::new("demo", backend, cfg);
//!
//!     let sleeper = service
//!         .new_instance("sleeper", ProcessConfig::builder("sleep").arg("100").build())
//!         .await?;
//!     println!("{}", serde_json::to_string(&sleeper.info().await)?);
//!
//!     sleeper.stop().await;
//!     sleeper.close().await?;
//!     Ok(())
//! }
//! ```
mod backend;
mod core;
mod error;
mod events;
mod policies;
mod process;
mod subscribers;

// ---- Public re-exports ----

pub use backend::{
    Backend, BackendRef, KEY_ERROR, KEY_NAME, KEY_PROCESS, NativeBackend, PartialStats,
    ProcessHandle,
};
pub use core::{
    Config, Exit, Instance, Service, ServiceBuilder, Watchdog, WatchdogExit, WatchdogParams,
};
pub use error::{BackendError, InstanceError, RuntimeError};
pub use events::{Bus, Event, EventKind};
pub use policies::{BackoffPolicy, JitterPolicy, RestartPolicy};
pub use process::{ProcessConfig, ProcessConfigBuilder, ResourceHints};
pub use subscribers::{Subscribe, SubscriberSet};

// Optional: expose a simple built-in logger subscriber.
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
