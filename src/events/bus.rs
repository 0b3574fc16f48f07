//! # Broadcast bus for supervisor events.
//!
//! [`Bus`] wraps [`tokio::sync::broadcast`]. The supervisor, its background task and
//! the subscriber workers publish into it; one listener per supervisor fans events
//! out to the [`SubscriberSet`](crate::SubscriberSet), and callers may take their
//! own receiver with [`Supervisor::events`](crate::Supervisor::events).
//!
//! ## Rules
//! - `publish()` never blocks.
//! - A single ring buffer of `capacity` events is shared by all receivers; slow
//!   receivers observe `RecvError::Lagged(n)`.
//! - Events published with no receiver are dropped.

use tokio::sync::broadcast;

use super::event::Event;

/// Broadcast channel for supervisor events. Cheap to clone.
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Creates a bus; capacity is clamped to at least 1.
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel::<Event>(capacity.max(1));
        Self { tx }
    }

    /// Publishes an event to all current receivers.
    pub fn publish(&self, ev: Event) {
        let _ = self.tx.send(ev);
    }

    /// Creates a receiver observing events sent from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}
