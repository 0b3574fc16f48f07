//! # Cache facade.
//!
//! [`Cache`] exposes `set` / `get` / `delete` over any connector whose handle
//! implements [`CacheOps`]. A missing key is `Ok(None)`, not an error.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::core::Supervisor;
use crate::error::{SupervisorError, TransportError};
use crate::transport::Connector;

/// Key/value operations a cache handle supports.
#[async_trait]
pub trait CacheOps: Send + Sync {
    /// Stores `value` under `key`. `ttl = 0s` keeps it until deleted.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), TransportError>;

    /// Reads `key`; `None` if absent or expired.
    async fn get(&self, key: &str) -> Result<Option<String>, TransportError>;

    /// Removes `key`. Removing an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<(), TransportError>;
}

/// Cache operations routed through a [`Supervisor`].
pub struct Cache<C: Connector> {
    supervisor: Arc<Supervisor<C>>,
}

impl<C> Cache<C>
where
    C: Connector,
    C::Handle: CacheOps,
{
    /// Wraps a supervisor.
    pub fn new(supervisor: Arc<Supervisor<C>>) -> Self {
        Self { supervisor }
    }

    /// Stores `value` under `key` for `ttl` (`0s` = no expiry).
    ///
    /// # Errors
    /// See [`SupervisorError`].
    pub async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), SupervisorError> {
        self.supervisor
            .with_lease(|cache| async move { cache.set(key, value, ttl).await })
            .await
    }

    /// Reads `key`.
    ///
    /// # Errors
    /// See [`SupervisorError`].
    pub async fn get(&self, key: &str) -> Result<Option<String>, SupervisorError> {
        self.supervisor
            .with_lease(|cache| async move { cache.get(key).await })
            .await
    }

    /// Removes `key`.
    ///
    /// # Errors
    /// See [`SupervisorError`].
    pub async fn delete(&self, key: &str) -> Result<(), SupervisorError> {
        self.supervisor
            .with_lease(|cache| async move { cache.delete(key).await })
            .await
    }

    /// The underlying supervisor.
    pub fn supervisor(&self) -> &Arc<Supervisor<C>> {
        &self.supervisor
    }

    /// Shuts the underlying supervisor down.
    pub async fn shutdown(&self) {
        self.supervisor.shutdown().await;
    }
}

impl<C: Connector> Clone for Cache<C> {
    fn clone(&self) -> Self {
        Self {
            supervisor: Arc::clone(&self.supervisor),
        }
    }
}
