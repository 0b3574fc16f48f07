//! # Redis connector.
//!
//! The handle is one [`MultiplexedConnection`]; every command runs on a clone of it,
//! so concurrent callers pipeline over the same socket. Closing a [`RedisHandle`]
//! fences it: leases still holding it get [`TransportError::Closed`] instead of
//! reaching the server.

use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;
use tokio_util::sync::CancellationToken;

use crate::error::TransportError;
use crate::facades::CacheOps;
use crate::transport::{BackendKind, Connector};

/// Maps a redis error onto the transport taxonomy.
fn classify(err: redis::RedisError) -> TransportError {
    if err.is_io_error()
        || err.is_connection_dropped()
        || err.is_connection_refusal()
        || err.is_timeout()
    {
        TransportError::connection(err)
    } else {
        TransportError::operation(err)
    }
}

/// Opens multiplexed Redis connections.
/// One supervised Redis connection.
pub struct RedisHandle {
    conn: MultiplexedConnection,
    closed: CancellationToken,
}

impl RedisHandle {
    fn new(conn: MultiplexedConnection) -> Self {
        Self {
            conn,
            closed: CancellationToken::new(),
        }
    }

    /// A clone of the connection for one command, unless the handle was closed.
    fn conn(&self) -> Result<MultiplexedConnection, TransportError> {
        ensure_open(&self.closed)?;
        Ok(self.conn.clone())
    }

    /// True until [`Connector::close`] ran on this handle.
    pub fn is_open(&self) -> bool {
        !self.closed.is_cancelled()
    }
}

fn ensure_open(closed: &CancellationToken) -> Result<(), TransportError> {
    if closed.is_cancelled() {
        Err(TransportError::Closed)
    } else {
        Ok(())
    }
}

/// Opens multiplexed Redis connections.
#[derive(Clone, Debug)]
pub struct RedisConnector {
    client: redis::Client,
}

impl RedisConnector {
    /// Connector for `uri` (`redis://host:6379/0`).
    ///
    /// # Errors
    /// [`TransportError::Operation`] if the URI does not parse.
    pub fn new(uri: &str) -> Result<Self, TransportError> {
        let client = redis::Client::open(uri).map_err(TransportError::operation)?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Connector for RedisConnector {
    type Handle = RedisHandle;

    fn kind(&self) -> BackendKind {
        BackendKind::Cache
    }

    fn name(&self) -> &'static str {
        "redis"
    }

    async fn connect(&self) -> Result<RedisHandle, TransportError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map(RedisHandle::new)
            .map_err(TransportError::connection)
    }

    async fn probe(&self, handle: &RedisHandle) -> Result<(), TransportError> {
        let mut conn = handle.conn()?;
        let pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(classify)?;
        if pong == "PONG" {
            Ok(())
        } else {
            Err(TransportError::connection(format!("unexpected PING reply {pong:?}")))
        }
    }

    async fn close(&self, handle: &RedisHandle) {
        // The socket itself goes away with the last clone.
        handle.closed.cancel();
        tracing::debug!("redis connection closed");
    }
}

#[async_trait]
impl CacheOps for RedisHandle {
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), TransportError> {
        let mut conn = self.conn()?;
        if ttl.is_zero() {
            conn.set::<_, _, ()>(key, value).await.map_err(classify)
        } else {
            let millis = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
            conn.pset_ex::<_, _, ()>(key, value, millis)
                .await
                .map_err(classify)
        }
    }

    async fn get(&self, key: &str) -> Result<Option<String>, TransportError> {
        let mut conn = self.conn()?;
        conn.get::<_, Option<String>>(key).await.map_err(classify)
    }

    async fn delete(&self, key: &str) -> Result<(), TransportError> {
        let mut conn = self.conn()?;
        conn.del::<_, ()>(key).await.map_err(classify)
    }
}
