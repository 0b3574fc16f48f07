//! Supervisor events: types and broadcast bus.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `Supervisor` (connect, suspect reports, shutdown), the background
//!   `Worker` (probe failures, reconnect attempts, degradation), `SubscriberSet`
//!   workers (overflow/panic).
//! - **Consumers**: the per-supervisor listener feeding `SubscriberSet`, and any
//!   receiver obtained via `Supervisor::events()`.

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
