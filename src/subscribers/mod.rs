//! # Event subscribers.
//!
//! This module provides the [`Subscribe`] trait and the [`SubscriberSet`] fan-out
//! that delivers lifecycle events from the [`Bus`](crate::Bus) to user observers.
//!
//! ## Architecture
//! ```text
//! Instance ── publish(Event) ──► Bus ──► service listener ──► SubscriberSet::emit
//!                                                                  │
//!                                                    ┌─────────────┼─────────────┐
//!                                                    ▼             ▼             ▼
//!                                                [queue S1]    [queue S2]    [queue SN]
//!                                                    │             │             │
//!                                                 on_event()    on_event()    on_event()
//! ```
//!
//! ## Implementing custom subscribers
//! ```no_run
//! use procvisor::{Event, EventKind, Subscribe};
//! use async_trait::async_trait;
//!
//! struct CrashCounter;
//!
//! #[async_trait]
//! impl Subscribe for CrashCounter {
//!     async fn on_event(&self, event: &Event) {
//!         if event.kind == EventKind::InstanceExited {
//!             // increment a counter, page someone, ...
//!         }
//!     }
//! }
//! ```

#[cfg(feature = "logging")]
mod embedded;
mod set;
mod subscribe;

#[cfg(feature = "logging")]
pub use embedded::LogWriter;
pub use set::SubscriberSet;
pub use subscribe::Subscribe;
