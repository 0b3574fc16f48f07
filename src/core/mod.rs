//! Supervisor core: the handle slot, its worker task and the reconnect machinery.
//!
//! The public API from this module is [`Supervisor`] (with [`SupervisorBuilder`] and
//! [`SupervisorConfig`]) and the state types it exposes.
//!
//! Internal modules:
//! - [`state`]: phase, status and the lock-protected slot;
//! - [`health`]: waits until the installed handle fails (polling or event-driven);
//! - [`reconnect`]: one reconnect cycle with backoff and attempt bound;
//! - [`worker`]: the background task tying health and reconnect together;
//! - [`supervisor`]: acquire, swap and shutdown.

mod builder;
mod config;
mod health;
mod reconnect;
mod state;
mod supervisor;
mod worker;

pub use builder::SupervisorBuilder;
pub use config::SupervisorConfig;
pub use reconnect::ReconnectAttempt;
pub use state::{Lease, Phase, Status};
pub use supervisor::Supervisor;
