//! # Events emitted by connection supervisors.
//!
//! [`EventKind`] classifies what happened to a supervised connection; [`Event`]
//! carries the metadata (backend name, generation, attempt, delay, reason).
//!
//! ## Ordering guarantees
//! Every event gets a process-wide, monotonically increasing `seq`.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use linkvisor::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::ReconnectFailed)
//!     .with_backend("redis")
//!     .with_attempt(2)
//!     .with_reason("connection refused");
//!
//! assert_eq!(ev.kind, EventKind::ReconnectFailed);
//! assert_eq!(ev.backend.as_deref(), Some("redis"));
//! assert_eq!(ev.attempt, Some(2));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

use crate::core::ReconnectAttempt;
use crate::error::TransportError;

static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of supervisor events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Subscriber events ===
    /// Subscriber panicked while handling an event.
    ///
    /// Sets: `backend` (subscriber name), `reason` (panic message).
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets: `backend` (subscriber name), `reason`.
    SubscriberOverflow,

    // === Connection lifecycle ===
    /// Initial connection established; supervision started.
    ///
    /// Sets: `backend`, `generation` (always 1).
    Connected,

    /// A health probe failed or timed out.
    ///
    /// Sets: `backend`, `generation`, `reason`.
    ProbeFailed,

    /// The current handle was declared dead and removed.
    ///
    /// Sets: `backend`, `generation` (of the dead handle), `reason`.
    ConnectionLost,

    /// A caller reported a connectivity error on a lease.
    ///
    /// Sets: `backend`, `generation` (of the reported lease).
    SuspectReported,

    // === Reconnect cycle ===
    /// A reconnect attempt is starting.
    ///
    /// Sets: `backend`, `attempt` (1-based within the cycle).
    ReconnectStarting,

    /// A reconnect attempt failed.
    ///
    /// Sets: `backend`, `attempt`, `reason`, `timeout_ms` when the attempt timed out.
    ReconnectFailed,

    /// Next attempt scheduled.
    ///
    /// Sets: `backend`, `attempt` (the failed one), `delay_ms`.
    BackoffScheduled,

    /// A fresh handle was installed.
    ///
    /// Sets: `backend`, `generation` (new), `attempt`.
    Reconnected,

    /// Bounded attempts exhausted; waiting for rearm.
    ///
    /// Sets: `backend`, `attempt` (attempts made).
    Degraded,

    /// A degraded supervisor was re-armed.
    ///
    /// Sets: `backend`.
    Rearmed,

    // === Shutdown ===
    /// `shutdown()` was called.
    ///
    /// Sets: `backend`.
    ShutdownRequested,

    /// Background task stopped and the handle was closed. Always the last event.
    ///
    /// Sets: `backend`, `generation` (last installed).
    Closed,
}

/// Supervisor event with optional metadata.
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,
    /// Backend (or subscriber) name.
    pub backend: Option<Arc<str>>,
    /// Connection generation the event refers to.
    pub generation: Option<u64>,
    /// Reconnect attempt number (1-based).
    pub attempt: Option<u32>,
    /// Delay before the next attempt, in milliseconds.
    pub delay_ms: Option<u32>,
    /// Timeout that was hit, in milliseconds.
    pub timeout_ms: Option<u32>,
    /// Human-readable reason.
    pub reason: Option<Arc<str>>,
}

impl Event {
    /// Creates an event with the current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            backend: None,
            generation: None,
            attempt: None,
            delay_ms: None,
            timeout_ms: None,
            reason: None,
        }
    }

    /// Attaches a backend name.
    #[inline]
    pub fn with_backend(mut self, backend: impl Into<Arc<str>>) -> Self {
        self.backend = Some(backend.into());
        self
    }

    /// Attaches a generation.
    #[inline]
    pub fn with_generation(mut self, generation: u64) -> Self {
        self.generation = Some(generation);
        self
    }

    /// Attaches an attempt number.
    #[inline]
    pub fn with_attempt(mut self, n: u32) -> Self {
        self.attempt = Some(n);
        self
    }

    /// Attaches a delay (stored as milliseconds).
    #[inline]
    pub fn with_delay(mut self, d: Duration) -> Self {
        self.delay_ms = Some(as_ms(d));
        self
    }

    /// Attaches a timeout (stored as milliseconds).
    #[inline]
    pub fn with_timeout(mut self, d: Duration) -> Self {
        self.timeout_ms = Some(as_ms(d));
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Builds the event describing a finished reconnect attempt.
    pub(crate) fn from_attempt(backend: &'static str, attempt: &ReconnectAttempt) -> Self {
        let ev = match &attempt.outcome {
            Ok(generation) => Event::new(EventKind::Reconnected).with_generation(*generation),
            Err(err) => {
                let ev = Event::new(EventKind::ReconnectFailed).with_reason(err.to_string());
                match err {
                    TransportError::Timeout { timeout } => ev.with_timeout(*timeout),
                    _ => ev,
                }
            }
        };
        ev.with_backend(backend).with_attempt(attempt.attempt)
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_backend(subscriber)
            .with_reason(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_backend(subscriber)
            .with_reason(info)
    }
}

fn as_ms(d: Duration) -> u32 {
    d.as_millis().min(u128::from(u32::MAX)) as u32
}
