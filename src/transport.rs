//! # Transport capability interface.
//!
//! A [`Connector`] knows how to open, check and close one kind of network client.
//! The [`Supervisor`](crate::Supervisor) is written once against this trait and is
//! instantiated per backend.
//!
//! ```text
//! Connector::connect()  ──► H ──► Transport<H> { kind, created_at, generation }
//! Connector::probe(&H)       polled every health_interval   (HealthStrategy::Polling)
//! Connector::closed(&H)      awaited until the peer goes away (HealthStrategy::EventDriven)
//! Connector::close(&H)       called once, after the handle was replaced or on shutdown
//! ```
//!
//! ## Example
//! ```rust
//! use async_trait::async_trait;
//! use linkvisor::{BackendKind, Connector, TransportError};
//!
//! struct Loopback;
//!
//! #[async_trait]
//! impl Connector for Loopback {
//!     type Handle = ();
//!
//!     fn kind(&self) -> BackendKind { BackendKind::Cache }
//!     async fn connect(&self) -> Result<(), TransportError> { Ok(()) }
//!     async fn probe(&self, _handle: &()) -> Result<(), TransportError> { Ok(()) }
//!     async fn close(&self, _handle: &()) {}
//! }
//! ```

use std::fmt;
use std::ops::Deref;
use std::time::Instant;

use async_trait::async_trait;

use crate::error::TransportError;

/// Kind of backend a connector talks to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// Relational database.
    Relational,
    /// Message broker.
    Broker,
    /// Key/value cache.
    Cache,
}

impl BackendKind {
    /// Stable lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Relational => "relational",
            BackendKind::Broker => "broker",
            BackendKind::Cache => "cache",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a supervisor learns that its handle died.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum HealthStrategy {
    /// Periodic [`Connector::probe`] round trips.
    #[default]
    Polling,
    /// Wait on [`Connector::closed`]; the transport signals disconnects itself.
    EventDriven,
}

/// Capability interface of one backend's client.
///
/// Implementations must be cheap to share: the supervisor keeps the connector in an
/// `Arc` and calls it from its background task and from `shutdown()`.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Live client handle (socket, channel, driver pool, ...).
    type Handle: Send + Sync + 'static;

    /// Which kind of backend this is.
    fn kind(&self) -> BackendKind;

    /// Name used in events, logs and errors. Defaults to the kind name.
    fn name(&self) -> &'static str {
        self.kind().as_str()
    }

    /// Failure detection strategy supported by this transport.
    fn health(&self) -> HealthStrategy {
        HealthStrategy::Polling
    }

    /// Opens a fresh handle. The supervisor bounds this with `connect_timeout`.
    async fn connect(&self) -> Result<Self::Handle, TransportError>;

    /// Cheap round trip proving the handle still works. Bounded by `probe_timeout`.
    async fn probe(&self, handle: &Self::Handle) -> Result<(), TransportError>;

    /// Releases the handle. Errors are the connector's to log; the handle is gone either way.
    async fn close(&self, handle: &Self::Handle);

    /// Resolves once the handle is known to be closed by the peer or the network.
    ///
    /// Only used with [`HealthStrategy::EventDriven`]. The default never resolves.
    async fn closed(&self, _handle: &Self::Handle) {
        std::future::pending::<()>().await
    }
}

/// A live handle together with its bookkeeping.
pub struct Transport<H> {
    inner: H,
    kind: BackendKind,
    created_at: Instant,
    generation: u64,
}

impl<H> Transport<H> {
    pub(crate) fn new(inner: H, kind: BackendKind, generation: u64) -> Self {
        Self {
            inner,
            kind,
            created_at: Instant::now(),
            generation,
        }
    }

    /// Backend kind.
    pub fn kind(&self) -> BackendKind {
        self.kind
    }

    /// When the handle was established.
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Supervisor generation this handle was installed as.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// The raw client handle.
    pub fn get(&self) -> &H {
        &self.inner
    }
}

impl<H> Deref for Transport<H> {
    type Target = H;

    fn deref(&self) -> &H {
        &self.inner
    }
}

impl<H> fmt::Debug for Transport<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transport")
            .field("kind", &self.kind)
            .field("generation", &self.generation)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}
