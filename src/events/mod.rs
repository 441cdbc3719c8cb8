//! Lifecycle events: types and broadcast bus.
//!
//! This module groups the event **data model** and the **bus** used to
//! publish/subscribe to lifecycle events emitted by services, instances,
//! supervisor tasks and watchdogs.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `Service`, `Instance`, the supervisor task, `Watchdog`,
//!   `SubscriberSet` workers (overflow/panic).
//! - **Consumers**: the service listener (fans out to `SubscriberSet`) and
//!   anything that called [`Bus::subscribe`].

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
