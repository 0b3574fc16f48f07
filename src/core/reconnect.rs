//! # Reconnect cycle.
//!
//! Runs connect attempts until one succeeds, the [`ReconnectPolicy`](crate::ReconnectPolicy)
//! gives up, or the supervisor is shut down.
//!
//! ```text
//! loop {
//!   ├─► token cancelled?            → Cancelled
//!   ├─► publish ReconnectStarting
//!   ├─► connect() within connect_timeout (cancellable)
//!   │     ├─► Ok  → swap, publish Reconnected → Installed
//!   │     └─► Err → publish ReconnectFailed
//!   ├─► policy exhausted?           → Exhausted(attempts)
//!   ├─► publish BackoffScheduled
//!   └─► sleep(delay) (cancellable)
//! }
//! ```
//!
//! ## Rules
//! - Attempts are sequential; there is never more than one connect in flight.
//! - Attempt counting starts at 1 on every call.
//! - A handle that arrives after cancellation is closed, not installed.

use std::time::Duration;

use tokio::select;
use tokio::time::{self, Instant};

use crate::core::supervisor::Shared;
use crate::error::TransportError;
use crate::events::{Event, EventKind};
use crate::transport::Connector;

/// One finished connect attempt.
#[derive(Clone, Debug)]
pub struct ReconnectAttempt {
    /// When the attempt started.
    pub started_at: Instant,
    /// Attempt number within the cycle (1-based).
    pub attempt: u32,
    /// Backoff scheduled after this attempt, if any.
    pub delay: Option<Duration>,
    /// Installed generation, or why the attempt failed.
    pub outcome: Result<u64, TransportError>,
}

/// How a reconnect cycle ended.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Outcome {
    /// A fresh handle is installed.
    Installed,
    /// The bounded policy gave up after this many attempts.
    Exhausted(u32),
    /// The supervisor token was cancelled.
    Cancelled,
}

pub(crate) async fn reconnect<C: Connector>(shared: &Shared<C>) -> Outcome {
    let policy = shared.cfg.reconnect;
    let connect_timeout = shared.cfg.connect_timeout;
    let mut attempt: u32 = 0;

    loop {
        if shared.token.is_cancelled() {
            return Outcome::Cancelled;
        }
        attempt = attempt.saturating_add(1);
        shared.publish(Event::new(EventKind::ReconnectStarting).with_attempt(attempt));

        let started_at = Instant::now();
        let res = select! {
            _ = shared.token.cancelled() => return Outcome::Cancelled,
            res = time::timeout(connect_timeout, shared.connector.connect()) => res,
        };
        let res = res.unwrap_or(Err(TransportError::Timeout {
            timeout: connect_timeout,
        }));

        let err = match res {
            Ok(handle) => {
                if shared.token.is_cancelled() {
                    shared.close_raw(&handle).await;
                    return Outcome::Cancelled;
                }
                let generation = shared.swap(handle).await;
                shared.publish(Event::from_attempt(
                    shared.name,
                    &ReconnectAttempt {
                        started_at,
                        attempt,
                        delay: None,
                        outcome: Ok(generation),
                    },
                ));
                return Outcome::Installed;
            }
            Err(err) => err,
        };

        let exhausted = policy.is_exhausted(attempt);
        let delay = (!exhausted).then(|| policy.delay_after(attempt));
        let record = ReconnectAttempt {
            started_at,
            attempt,
            delay,
            outcome: Err(err),
        };
        tracing::debug!(
            backend = shared.name,
            attempt,
            elapsed_ms = record.started_at.elapsed().as_millis() as u64,
            "reconnect attempt failed"
        );
        shared.publish(Event::from_attempt(shared.name, &record));

        let Some(delay) = delay else {
            return Outcome::Exhausted(attempt);
        };
        shared.publish(
            Event::new(EventKind::BackoffScheduled)
                .with_attempt(attempt)
                .with_delay(delay),
        );

        let sleep = time::sleep(delay);
        tokio::pin!(sleep);
        select! {
            _ = &mut sleep => {}
            _ = shared.token.cancelled() => return Outcome::Cancelled,
        }
    }
}
