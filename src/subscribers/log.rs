//! # LogWriter: renders events through `tracing`.
//!
//! ## Example output
//! ```text
//! INFO  connected backend="redis" generation=1
//! WARN  probe failed backend="redis" generation=1 reason="timed out after 2s"
//! WARN  connection lost backend="redis" generation=1
//! INFO  reconnect starting backend="redis" attempt=1
//! ERROR reconnect failed backend="redis" attempt=1 reason="connection refused"
//! INFO  reconnected backend="redis" generation=2 attempt=2
//! ```

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;
use async_trait::async_trait;

/// Subscriber that logs every event with `tracing`.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let backend = e.backend.as_deref().unwrap_or("unknown");
        let reason = e.reason.as_deref().unwrap_or("");
        match e.kind {
            EventKind::Connected => {
                tracing::info!(backend, generation = ?e.generation, "connected");
            }
            EventKind::ProbeFailed => {
                tracing::warn!(backend, generation = ?e.generation, reason, "probe failed");
            }
            EventKind::ConnectionLost => {
                tracing::warn!(backend, generation = ?e.generation, reason, "connection lost");
            }
            EventKind::SuspectReported => {
                tracing::debug!(backend, generation = ?e.generation, "suspect reported");
            }
            EventKind::ReconnectStarting => {
                tracing::info!(backend, attempt = ?e.attempt, "reconnect starting");
            }
            EventKind::ReconnectFailed => {
                tracing::error!(
                    backend,
                    attempt = ?e.attempt,
                    timeout_ms = ?e.timeout_ms,
                    reason,
                    "reconnect failed"
                );
            }
            EventKind::BackoffScheduled => {
                tracing::info!(
                    backend,
                    attempt = ?e.attempt,
                    delay_ms = ?e.delay_ms,
                    "backoff scheduled"
                );
            }
            EventKind::Reconnected => {
                tracing::info!(
                    backend,
                    generation = ?e.generation,
                    attempt = ?e.attempt,
                    "reconnected"
                );
            }
            EventKind::Degraded => {
                tracing::error!(backend, attempts = ?e.attempt, "degraded; waiting for rearm");
            }
            EventKind::Rearmed => {
                tracing::info!(backend, "rearmed");
            }
            EventKind::ShutdownRequested => {
                tracing::info!(backend, "shutdown requested");
            }
            EventKind::Closed => {
                tracing::info!(backend, generation = ?e.generation, "closed");
            }
            EventKind::SubscriberOverflow => {
                tracing::warn!(subscriber = backend, reason, "subscriber overflow");
            }
            EventKind::SubscriberPanicked => {
                tracing::error!(subscriber = backend, reason, "subscriber panicked");
            }
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}
