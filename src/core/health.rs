//! # Failure detection for the installed handle.
//!
//! [`wait_for_failure`] blocks until the handle is known to be dead or the supervisor
//! is shutting down.
//!
//! ```text
//! Polling:      ──tick──► probe ──ok──► ──tick──► probe ──err/timeout──► Some(reason)
//!                           ▲
//!               suspect ────┘ (probe now, don't wait for the tick)
//!
//! EventDriven:  closed(&handle) ─────────────────────────────────────────► Some(reason)
//!               suspect ──► probe ──err/timeout─────────────────────────► Some(reason)
//!
//! token cancelled (any point, including mid-probe) ────────────────────► None
//! ```

use std::sync::Arc;

use tokio::select;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::core::supervisor::Shared;
use crate::error::TransportError;
use crate::events::{Event, EventKind};
use crate::transport::{Connector, HealthStrategy, Transport};

/// Waits until `transport` fails.
///
/// Returns the failure reason, or `None` when the supervisor token was cancelled.
pub(crate) async fn wait_for_failure<C: Connector>(
    shared: &Shared<C>,
    transport: &Arc<Transport<C::Handle>>,
) -> Option<String> {
    match shared.connector.health() {
        HealthStrategy::Polling => poll(shared, transport).await,
        HealthStrategy::EventDriven => listen(shared, transport).await,
    }
}

async fn poll<C: Connector>(
    shared: &Shared<C>,
    transport: &Arc<Transport<C::Handle>>,
) -> Option<String> {
    let interval = shared.cfg.health_interval_clamped();
    let mut ticker = time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        select! {
            _ = shared.token.cancelled() => return None,
            _ = ticker.tick() => {}
            _ = shared.suspect.notified() => {}
        }
        match probe(shared, transport).await? {
            Ok(()) => continue,
            Err(err) => return Some(err.to_string()),
        }
    }
}

async fn listen<C: Connector>(
    shared: &Shared<C>,
    transport: &Arc<Transport<C::Handle>>,
) -> Option<String> {
    loop {
        select! {
            _ = shared.token.cancelled() => return None,
            _ = shared.connector.closed(transport.get()) => {
                return Some(TransportError::connection("closed by peer").to_string());
            }
            _ = shared.suspect.notified() => {
                if let Err(err) = probe(shared, transport).await? {
                    return Some(err.to_string());
                }
            }
        }
    }
}

/// One bounded probe; `None` if cancelled mid-flight.
async fn probe<C: Connector>(
    shared: &Shared<C>,
    transport: &Arc<Transport<C::Handle>>,
) -> Option<Result<(), TransportError>> {
    let timeout = shared.cfg.probe_timeout;
    let res = select! {
        _ = shared.token.cancelled() => return None,
        res = time::timeout(timeout, shared.connector.probe(transport.get())) => res,
    };
    let res = res.unwrap_or(Err(TransportError::Timeout { timeout }));

    if let Err(err) = &res {
        let ev = Event::new(EventKind::ProbeFailed)
            .with_generation(transport.generation())
            .with_reason(err.to_string());
        let ev = match err {
            TransportError::Timeout { timeout } => ev.with_timeout(*timeout),
            _ => ev,
        };
        shared.publish(ev);
    }
    Some(res)
}
