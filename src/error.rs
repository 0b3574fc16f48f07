//! Error types used by supervisors, connectors and facades.
//!
//! This module defines two enums:
//!
//! - [`TransportError`]: raised by a [`Connector`](crate::Connector) or a raw backend call.
//! - [`SupervisorError`]: the caller-visible taxonomy returned by supervisors and facades.
//!
//! Facades translate every backend failure into a [`TransportError`] first and then
//! classify it with [`TransportError::is_connectivity`]: connectivity failures become
//! [`SupervisorError::Unavailable`], everything else [`SupervisorError::OperationFailed`].

use std::time::Duration;
use thiserror::Error;

/// # Errors produced by a transport.
///
/// Returned from [`Connector::connect`](crate::Connector::connect),
/// [`Connector::probe`](crate::Connector::probe) and the backend-specific operation traits.
#[non_exhaustive]
#[derive(Error, Debug, Clone)]
pub enum TransportError {
    /// Connect or probe did not complete within its deadline.
    #[error("timed out after {timeout:?}")]
    Timeout {
        /// The deadline that was exceeded.
        timeout: Duration,
    },

    /// The connection is broken or could not be established.
    #[error("connection error: {error}")]
    Connection {
        /// The underlying error message.
        error: String,
    },

    /// The backend rejected the operation (bad query, protocol violation, ...).
    #[error("operation failed: {error}")]
    Operation {
        /// The underlying error message.
        error: String,
    },

    /// The handle was closed locally.
    #[error("connection closed")]
    Closed,
}

impl TransportError {
    /// Shorthand for [`TransportError::Connection`].
    pub fn connection(error: impl ToString) -> Self {
        TransportError::Connection {
            error: error.to_string(),
        }
    }

    /// Shorthand for [`TransportError::Operation`].
    pub fn operation(error: impl ToString) -> Self {
        TransportError::Operation {
            error: error.to_string(),
        }
    }

    /// Returns `true` when the error means the connection itself is unusable.
    ///
    /// # Example
    /// ```
    /// use linkvisor::TransportError;
    ///
    /// assert!(TransportError::Closed.is_connectivity());
    /// assert!(!TransportError::operation("syntax error").is_connectivity());
    /// ```
    pub fn is_connectivity(&self) -> bool {
        !matches!(self, TransportError::Operation { .. })
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            TransportError::Timeout { .. } => "transport_timeout",
            TransportError::Connection { .. } => "transport_connection",
            TransportError::Operation { .. } => "transport_operation",
            TransportError::Closed => "transport_closed",
        }
    }
}

/// # Errors visible to callers of a supervisor or facade.
///
/// | Variant           | Meaning                                            | Caller action               |
/// |-------------------|----------------------------------------------------|-----------------------------|
/// | `ConnectFailed`   | construction could not establish the first handle | retry construction or abort |
/// | `Unavailable`     | no live handle right now (reconnect in progress)   | retry the operation later   |
/// | `OperationFailed` | backend rejected the call                          | fix the request             |
/// | `Closed`          | supervisor is shutting down or shut down           | stop                        |
/// | `Degraded`        | bounded reconnect attempts exhausted               | operator intervention       |
#[non_exhaustive]
#[derive(Error, Debug, Clone)]
pub enum SupervisorError {
    /// Initial connection could not be established.
    #[error("{backend}: initial connect failed: {source}")]
    ConnectFailed {
        /// Backend name.
        backend: &'static str,
        /// Why the connect failed.
        #[source]
        source: TransportError,
    },

    /// No usable handle is installed.
    #[error("{backend}: connection unavailable: {reason}")]
    Unavailable {
        /// Backend name.
        backend: &'static str,
        /// Human-readable cause.
        reason: String,
    },

    /// The backend rejected the operation.
    #[error("{backend}: operation failed: {source}")]
    OperationFailed {
        /// Backend name.
        backend: &'static str,
        /// The backend error.
        #[source]
        source: TransportError,
    },

    /// The supervisor was shut down.
    #[error("{backend}: supervisor closed")]
    Closed {
        /// Backend name.
        backend: &'static str,
    },

    /// Reconnect attempts exhausted; the supervisor waits for [`rearm`](crate::Supervisor::rearm).
    #[error("{backend}: degraded after {attempts} failed reconnect attempts")]
    Degraded {
        /// Backend name.
        backend: &'static str,
        /// Number of attempts made in the exhausted cycle.
        attempts: u32,
    },
}

impl SupervisorError {
    /// Classifies a backend error raised while running an operation on a lease.
    pub fn from_transport(backend: &'static str, err: TransportError) -> Self {
        if err.is_connectivity() {
            SupervisorError::Unavailable {
                backend,
                reason: err.to_string(),
            }
        } else {
            SupervisorError::OperationFailed {
                backend,
                source: err,
            }
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use linkvisor::SupervisorError;
    ///
    /// let err = SupervisorError::Closed { backend: "redis" };
    /// assert_eq!(err.as_label(), "supervisor_closed");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            SupervisorError::ConnectFailed { .. } => "supervisor_connect_failed",
            SupervisorError::Unavailable { .. } => "supervisor_unavailable",
            SupervisorError::OperationFailed { .. } => "supervisor_operation_failed",
            SupervisorError::Closed { .. } => "supervisor_closed",
            SupervisorError::Degraded { .. } => "supervisor_degraded",
        }
    }

    /// Indicates whether retrying the whole operation later may succeed.
    ///
    /// Returns `true` for [`SupervisorError::Unavailable`] only.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SupervisorError::Unavailable { .. })
    }

    /// Backend name the error originated from.
    pub fn backend(&self) -> &'static str {
        match self {
            SupervisorError::ConnectFailed { backend, .. }
            | SupervisorError::Unavailable { backend, .. }
            | SupervisorError::OperationFailed { backend, .. }
            | SupervisorError::Closed { backend }
            | SupervisorError::Degraded { backend, .. } => backend,
        }
    }
}
