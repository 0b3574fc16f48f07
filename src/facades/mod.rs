//! # Backend facades.
//!
//! A facade is the caller-facing API of one backend kind. Every operation does the same
//! four things:
//!
//! ```text
//! acquire() ──► exactly one backend call on the lease ──► classify error ──► return
//!                                                            │
//!                               connectivity error ──► report_suspect(generation)
//! ```
//!
//! Facades never retry and hold no mutable state; cloning one is cheap.
//!
//! | Facade       | Backend kind | Handle capability |
//! |--------------|--------------|-------------------|
//! | [`Cache`]    | cache        | [`CacheOps`]      |
//! | [`Broker`]   | broker       | [`BrokerOps`]     |
//! | `Database`   | relational   | sqlx `PgPool`     |

mod broker;
mod cache;
#[cfg(feature = "postgres")]
mod relational;

pub use broker::{
    Acknowledge, Broker, BrokerOps, ConsumeOptions, Delivery, DeliveryStream, MessageStream,
    Publish, QueueInfo, QueueSpec,
};
pub use cache::{Cache, CacheOps};
#[cfg(feature = "postgres")]
pub use relational::{Database, SqlValue, Transaction};
