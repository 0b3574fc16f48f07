//! # linkvisor
//!
//! **Linkvisor** keeps long-lived connections to infrastructure backends alive.
//!
//! Each backend (relational database, message broker, cache) gets one
//! [`Supervisor`] that owns its live handle, hands it out per operation, notices when
//! it dies and replaces it in the background. Callers use a thin facade
//! ([`facades::Database`], [`facades::Broker`], [`facades::Cache`]) and get a typed
//! [`SupervisorError`] instead of a hang or a panic while the backend is away.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!      ┌──────────┐        ┌──────────┐        ┌──────────┐
//!      │ Database │        │  Broker  │        │  Cache   │   facades
//!      └────┬─────┘        └────┬─────┘        └────┬─────┘
//!           │ acquire()         │                   │
//!           ▼                   ▼                   ▼
//! ┌──────────────────┐ ┌──────────────────┐ ┌──────────────────┐
//! │ Supervisor<Pg>   │ │ Supervisor<Amqp> │ │ Supervisor<Redis>│
//! │ - RwLock<Slot>   │ │ - RwLock<Slot>   │ │ - RwLock<Slot>   │
//! │ - watch<Status>  │ │ - watch<Status>  │ │ - watch<Status>  │
//! │ - Bus            │ │ - Bus            │ │ - Bus            │
//! │ - worker task    │ │ - worker task    │ │ - worker task    │
//! └────────┬─────────┘ └────────┬─────────┘ └────────┬─────────┘
//!          │ connect/probe/close via the Connector trait
//!          ▼                    ▼                    ▼
//!       sqlx PgPool        lapin session     redis multiplexed
//! ```
//!
//! ### Lifecycle
//! ```text
//! connect() ── first handle (or ConnectFailed, nothing spawned)
//!    │
//!    ▼
//! Healthy ── probe fails / peer closes ──► Detecting ──► Reconnecting
//!    ▲                                                      │
//!    └───────────── new handle installed (generation+1) ◄───┤
//!                                                           │ bounded attempts exhausted
//!                                                           ▼
//!                                           Degraded ── rearm() ──► Reconnecting
//!
//! shutdown() ── from any phase ──► Closed
//! ```
//!
//! ## Features
//! | Area              | Description                                                     | Key types / traits                      |
//! |-------------------|-----------------------------------------------------------------|-----------------------------------------|
//! | **Supervision**   | Own, watch and replace one backend handle.                      | [`Supervisor`], [`Connector`]           |
//! | **Policies**      | Backoff, jitter and attempt bounds for reconnects.              | [`ReconnectPolicy`], [`BackoffPolicy`]  |
//! | **Facades**       | Per-operation acquire, error classification.                    | [`facades::Cache`], [`facades::Broker`] |
//! | **Subscriber API**| Hook into connection events (logging, metrics, alerts).         | [`Subscribe`], [`Event`]                |
//! | **Errors**        | Typed caller-facing errors.                                     | [`SupervisorError`], [`TransportError`] |
//! | **Configuration** | Timeouts and retry settings per supervisor.                     | [`SupervisorConfig`]                    |
//!
//! ## Optional features
//! - `inmemory` (default): in-process backend for tests and demos.
//! - `logging` (default): built-in [`LogWriter`] subscriber rendering events with `tracing`.
//! - `postgres`, `redis`, `amqp`: real backends.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use linkvisor::backends::memory::{MemoryConnector, MemoryServer};
//! use linkvisor::facades::Cache;
//! use linkvisor::{Supervisor, SupervisorConfig};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = MemoryServer::new();
//!     let sup = Supervisor::connect(MemoryConnector::new(server), SupervisorConfig::default()).await?;
//!     let cache = Cache::new(Arc::new(sup));
//!
//!     cache.set("greeting", "hello", Duration::from_secs(60)).await?;
//!     assert_eq!(cache.get("greeting").await?.as_deref(), Some("hello"));
//!
//!     cache.shutdown().await;
//!     Ok(())
//! }
//! ```
mod core;
mod error;
mod events;
mod policies;
mod subscribers;
mod transport;

pub mod backends;
pub mod facades;
pub mod shutdown;

// ---- Public re-exports ----

pub use core::{
    Lease, Phase, ReconnectAttempt, Status, Supervisor, SupervisorBuilder, SupervisorConfig,
};
pub use error::{SupervisorError, TransportError};
pub use events::{Bus, Event, EventKind};
pub use policies::{BackoffPolicy, JitterPolicy, ReconnectPolicy};
pub use subscribers::{Subscribe, SubscriberSet};
pub use transport::{BackendKind, Connector, HealthStrategy, Transport};

// Optional: built-in logger subscriber.
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
