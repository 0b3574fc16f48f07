//! # Message broker facade.
//!
//! [`Broker`] declares queues, publishes and consumes over any connector whose handle
//! implements [`BrokerOps`].
//!
//! ## Consuming across reconnects
//! A [`MessageStream`] is bound to the handle it was opened on. When that handle is
//! replaced the stream ends (or yields an `Unavailable` error); call
//! [`Broker::consume`] again to continue on the new handle.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;

use crate::core::Supervisor;
use crate::error::{SupervisorError, TransportError};
use crate::transport::Connector;

/// Queue declaration parameters.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QueueSpec {
    /// Queue name.
    pub name: String,
    /// Survives a broker restart.
    pub durable: bool,
    /// Deleted when the last consumer goes away.
    pub auto_delete: bool,
    /// Usable only by the declaring connection.
    pub exclusive: bool,
}

impl QueueSpec {
    /// A durable, shared queue.
    pub fn durable(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            durable: true,
            ..Self::default()
        }
    }
}

/// What the broker reported for a declared queue.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueueInfo {
    /// Queue name (server-generated when declared with an empty name).
    pub name: String,
    /// Messages ready for delivery.
    pub message_count: u32,
    /// Active consumers.
    pub consumer_count: u32,
}

/// An outgoing message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Publish {
    /// Target exchange (empty = default exchange, routes by queue name).
    pub exchange: String,
    /// Routing key.
    pub routing_key: String,
    /// Payload.
    pub body: Vec<u8>,
    /// Application headers.
    pub headers: BTreeMap<String, String>,
    /// Persist the message on the broker.
    pub persistent: bool,
    /// MIME type of `body`.
    pub content_type: String,
}

impl Publish {
    /// A persistent JSON message to `routing_key` on the default exchange.
    pub fn to_queue(routing_key: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            exchange: String::new(),
            routing_key: routing_key.into(),
            body: body.into(),
            headers: BTreeMap::new(),
            persistent: true,
            content_type: "application/json".to_string(),
        }
    }

    /// Adds an application header.
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }
}

/// Consumer parameters.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConsumeOptions {
    /// Consumer tag (empty = server-generated).
    pub consumer_tag: String,
    /// Deliveries count as acknowledged on receipt.
    pub auto_ack: bool,
    /// Only this consumer may read the queue.
    pub exclusive: bool,
    /// Unacknowledged deliveries in flight (`0` = unlimited).
    pub prefetch: u16,
}

/// Settles deliveries on the handle they came from.
#[async_trait]
pub trait Acknowledge: Send + Sync {
    /// Positive acknowledgement.
    async fn ack(&self, delivery_tag: u64) -> Result<(), TransportError>;

    /// Negative acknowledgement, optionally putting the message back on the queue.
    async fn nack(&self, delivery_tag: u64, requeue: bool) -> Result<(), TransportError>;
}

/// A received message.
pub struct Delivery {
    /// Per-channel delivery tag.
    pub delivery_tag: u64,
    /// Exchange the message was published to.
    pub exchange: String,
    /// Routing key it was published with.
    pub routing_key: String,
    /// Payload.
    pub body: Vec<u8>,
    /// Application headers.
    pub headers: BTreeMap<String, String>,
    /// Delivered before and not acknowledged.
    pub redelivered: bool,
    acker: Arc<dyn Acknowledge>,
}

impl Delivery {
    /// Creates a delivery settled through `acker`.
    pub fn new(
        delivery_tag: u64,
        exchange: String,
        routing_key: String,
        body: Vec<u8>,
        acker: Arc<dyn Acknowledge>,
    ) -> Self {
        Self {
            delivery_tag,
            exchange,
            routing_key,
            body,
            headers: BTreeMap::new(),
            redelivered: false,
            acker,
        }
    }

    /// Attaches headers.
    pub fn with_headers(mut self, headers: BTreeMap<String, String>) -> Self {
        self.headers = headers;
        self
    }

    /// Marks the delivery as redelivered.
    pub fn redelivered(mut self, redelivered: bool) -> Self {
        self.redelivered = redelivered;
        self
    }

    /// Acknowledges the message.
    ///
    /// Fails with a connectivity error if the handle it came from is gone.
    pub async fn ack(&self) -> Result<(), TransportError> {
        self.acker.ack(self.delivery_tag).await
    }

    /// Rejects the message.
    pub async fn nack(&self, requeue: bool) -> Result<(), TransportError> {
        self.acker.nack(self.delivery_tag, requeue).await
    }
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("delivery_tag", &self.delivery_tag)
            .field("exchange", &self.exchange)
            .field("routing_key", &self.routing_key)
            .field("body_len", &self.body.len())
            .field("redelivered", &self.redelivered)
            .finish_non_exhaustive()
    }
}

/// Deliveries as produced by a broker handle.
pub type DeliveryStream = BoxStream<'static, Result<Delivery, TransportError>>;

/// Deliveries as seen by facade callers.
pub type MessageStream = BoxStream<'static, Result<Delivery, SupervisorError>>;

/// Operations a broker handle supports.
#[async_trait]
pub trait BrokerOps: Send + Sync {
    /// Declares (or asserts) a queue.
    async fn declare_queue(&self, spec: &QueueSpec) -> Result<QueueInfo, TransportError>;

    /// Publishes one message.
    async fn publish(&self, message: &Publish) -> Result<(), TransportError>;

    /// Starts consuming `queue`. The stream ends when the broker cancels the consumer
    /// or the handle closes.
    async fn consume(
        &self,
        queue: &str,
        options: &ConsumeOptions,
    ) -> Result<DeliveryStream, TransportError>;
}

/// Broker operations routed through a [`Supervisor`].
pub struct Broker<C: Connector> {
    supervisor: Arc<Supervisor<C>>,
}

impl<C> Broker<C>
where
    C: Connector,
    C::Handle: BrokerOps,
{
    /// Wraps a supervisor.
    pub fn new(supervisor: Arc<Supervisor<C>>) -> Self {
        Self { supervisor }
    }

    /// Declares a queue.
    ///
    /// # Errors
    /// See [`SupervisorError`].
    pub async fn declare_queue(&self, spec: &QueueSpec) -> Result<QueueInfo, SupervisorError> {
        self.supervisor
            .with_lease(|broker| async move { broker.declare_queue(spec).await })
            .await
    }

    /// Publishes a message.
    ///
    /// # Errors
    /// See [`SupervisorError`].
    pub async fn publish(&self, message: &Publish) -> Result<(), SupervisorError> {
        self.supervisor
            .with_lease(|broker| async move { broker.publish(message).await })
            .await
    }

    /// Opens a consumer on `queue`.
    ///
    /// Stream errors are classified like operation errors. The stream does not survive
    /// a reconnect; see the [module docs](self).
    ///
    /// # Errors
    /// See [`SupervisorError`].
    pub async fn consume(
        &self,
        queue: &str,
        options: &ConsumeOptions,
    ) -> Result<MessageStream, SupervisorError> {
        let backend = self.supervisor.backend();
        let deliveries = self
            .supervisor
            .with_lease(|broker| async move { broker.consume(queue, options).await })
            .await?;
        Ok(deliveries
            .map(move |item| item.map_err(|err| SupervisorError::from_transport(backend, err)))
            .boxed())
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

impl<C: Connector> Clone for Broker<C> {
    fn clone(&self) -> Self {
        Self {
            supervisor: Arc::clone(&self.supervisor),
        }
    }
}

#[cfg(all(test, feature = "inmemory"))]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::backends::memory::{MemoryConnector, MemoryServer};
    use crate::core::SupervisorConfig;
    use crate::transport::BackendKind;

    async fn broker(server: &MemoryServer) -> Broker<MemoryConnector> {
        let connector = MemoryConnector::new(server.clone())
            .with_kind(BackendKind::Broker)
            .named("memory-broker")
            .event_driven();
        let cfg = SupervisorConfig {
            reconnect: crate::ReconnectPolicy::unbounded(crate::BackoffPolicy::constant(
                Duration::from_millis(100),
            )),
            ..SupervisorConfig::default()
        };
        let sup = Supervisor::builder(connector)
            .config(cfg)
            .connect()
            .await
            .expect("connect");
        Broker::new(Arc::new(sup))
    }

    #[tokio::test(start_paused = true)]
    async fn test_publish_and_consume_roundtrip() {
        let server = MemoryServer::new();
        let broker = broker(&server).await;

        let info = broker
            .declare_queue(&QueueSpec::durable("events"))
            .await
            .expect("declare");
        assert_eq!(info.name, "events");
        assert_eq!(info.message_count, 0);

        broker
            .publish(&Publish::to_queue("events", r#"{"id":1}"#).with_header("trace", "abc"))
            .await
            .expect("publish");

        let mut stream = broker
            .consume("events", &ConsumeOptions::default())
            .await
            .expect("consume");
        let delivery = stream.next().await.expect("item").expect("delivery");
        assert_eq!(delivery.body, br#"{"id":1}"#);
        assert_eq!(delivery.headers.get("trace").map(String::as_str), Some("abc"));
        delivery.ack().await.expect("ack");
        assert_eq!(server.queue_depth("events"), 0);

        broker.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_consume_restarts_after_reconnect() {
        let server = MemoryServer::new();
        let broker = broker(&server).await;
        broker
            .declare_queue(&QueueSpec::durable("jobs"))
            .await
            .expect("declare");
        broker
            .publish(&Publish::to_queue("jobs", "first"))
            .await
            .expect("publish");

        let mut stream = broker
            .consume("jobs", &ConsumeOptions::default())
            .await
            .expect("consume");
        let unacked = stream.next().await.expect("item").expect("delivery");
        assert_eq!(unacked.body, b"first");

        server.go_offline();
        assert!(stream.next().await.is_none());
        drop(stream);
        server.go_online();

        let mut status = broker.supervisor().watch();
        status
            .wait_for(|s| s.is_healthy() && s.generation == 2)
            .await
            .expect("reconnected");

        let mut stream = broker
            .consume("jobs", &ConsumeOptions::default())
            .await
            .expect("consume again");
        let again = stream.next().await.expect("item").expect("delivery");
        assert_eq!(again.body, b"first");
        assert!(again.redelivered);
        again.ack().await.expect("ack");

        broker.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_consume_unknown_queue_fails_without_reconnect() {
        let server = MemoryServer::new();
        let broker = broker(&server).await;

        let err = broker
            .consume("ghost", &ConsumeOptions::default())
            .await
            .err()
            .expect("no such queue");
        assert!(matches!(err, SupervisorError::OperationFailed { .. }));
        assert_eq!(broker.supervisor().generation(), 1);
        broker.shutdown().await;
    }
}
