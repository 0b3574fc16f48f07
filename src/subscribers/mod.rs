//! # Event subscribers.
//!
//! ```text
//! Supervisor / Worker ── publish(Event) ──► Bus ──► listener ──► SubscriberSet
//!                                                                  ├──► LogWriter
//!                                                                  └──► custom (metrics, alerts, ...)
//! ```
//!
//! ## Implementing custom subscribers
//! ```no_run
//! use linkvisor::{Event, EventKind, Subscribe};
//! use async_trait::async_trait;
//!
//! struct Alerts;
//!
//! #[async_trait]
//! impl Subscribe for Alerts {
//!     async fn on_event(&self, event: &Event) {
//!         if event.kind == EventKind::Degraded {
//!             // page someone
//!         }
//!     }
//!     fn name(&self) -> &'static str { "alerts" }
//! }
//! ```

#[cfg(feature = "logging")]
mod log;
mod set;
mod subscribe;

#[cfg(feature = "logging")]
pub use log::LogWriter;
pub use set::SubscriberSet;
pub use subscribe::Subscribe;
