//! Connector implementations.
//!
//! | Module       | Feature    | Client crate | Handle                      | Health       |
//! |--------------|------------|--------------|-----------------------------|--------------|
//! | [`memory`]   | `inmemory` | (none)       | `MemoryConnection`          | either       |
//! | `postgres`   | `postgres` | sqlx         | `PgPool`                    | polling      |
//! | `redis`      | `redis`    | redis        | `MultiplexedConnection`     | polling      |
//! | `amqp`       | `amqp`     | lapin        | `AmqpSession`               | event-driven |

#[cfg(feature = "amqp")]
pub mod amqp;
#[cfg(feature = "inmemory")]
pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;
#[cfg(feature = "redis")]
pub mod redis;
