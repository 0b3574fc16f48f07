//! # In-process backend.
//!
//! [`MemoryServer`] is a tiny cache + queue server living in the current process.
//! [`MemoryConnector`] opens [`MemoryConnection`]s to it, which implement both
//! [`CacheOps`] and [`BrokerOps`].
//!
//! The server can be taken down and brought back, which makes it the backend of
//! choice for exercising supervisors through outages:
//!
//! ```text
//! go_offline()  ─► every open connection dies, new connects are refused
//! go_online()   ─► connects succeed again (old connections stay dead)
//! fail_next_connects(n) ─► the next n connects fail even while online
//! stall_probes(true)    ─► probes hang (the supervisor's probe timeout fires)
//! ```
//!
//! Data survives outages: only connections die, not stored keys or queued messages.
//! TTLs use [`tokio::time::Instant`], so they follow paused test time.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use futures::StreamExt;
use tokio::sync::Notify;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

use crate::error::TransportError;
use crate::facades::{
    Acknowledge, BrokerOps, CacheOps, ConsumeOptions, Delivery, DeliveryStream, Publish,
    QueueInfo, QueueSpec,
};
use crate::transport::{BackendKind, Connector, HealthStrategy};

#[derive(Clone)]
struct Message {
    exchange: String,
    routing_key: String,
    body: Vec<u8>,
    headers: BTreeMap<String, String>,
    redelivered: bool,
}

#[derive(Default)]
struct Queue {
    messages: Mutex<VecDeque<Message>>,
    ready: Notify,
    consumers: AtomicU32,
}

impl Queue {
    fn messages(&self) -> MutexGuard<'_, VecDeque<Message>> {
        self.messages.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push_back(&self, message: Message) {
        self.messages().push_back(message);
        self.ready.notify_one();
    }

    fn push_front(&self, message: Message) {
        self.messages().push_front(message);
        self.ready.notify_one();
    }

    fn pop(&self) -> Option<Message> {
        self.messages().pop_front()
    }
}

struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

struct Inner {
    online: AtomicBool,
    /// Parent of every live connection token; replaced on each outage.
    link: Mutex<CancellationToken>,
    fail_connects: AtomicU32,
    stall_probes: AtomicBool,
    connect_delay: Mutex<Duration>,
    connects: AtomicUsize,
    closes: AtomicUsize,
    next_id: AtomicU64,
    entries: DashMap<String, Entry>,
    queues: DashMap<String, Arc<Queue>>,
}

/// An in-process cache and queue server. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct MemoryServer {
    inner: Arc<Inner>,
}

impl Default for MemoryServer {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryServer {
    /// Creates an online server with no data.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                online: AtomicBool::new(true),
                link: Mutex::new(CancellationToken::new()),
                fail_connects: AtomicU32::new(0),
                stall_probes: AtomicBool::new(false),
                connect_delay: Mutex::new(Duration::ZERO),
                connects: AtomicUsize::new(0),
                closes: AtomicUsize::new(0),
                next_id: AtomicU64::new(1),
                entries: DashMap::new(),
                queues: DashMap::new(),
            }),
        }
    }

    /// Drops every open connection and refuses new ones.
    pub fn go_offline(&self) {
        self.inner.online.store(false, Ordering::SeqCst);
        let mut link = self
            .inner
            .link
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        link.cancel();
        *link = CancellationToken::new();
    }

    /// Accepts connections again.
    pub fn go_online(&self) {
        self.inner.online.store(true, Ordering::SeqCst);
    }

    /// True while connections are accepted.
    pub fn is_online(&self) -> bool {
        self.inner.online.load(Ordering::SeqCst)
    }

    /// Makes the next `n` connects fail regardless of the online state.
    pub fn fail_next_connects(&self, n: u32) {
        self.inner.fail_connects.store(n, Ordering::SeqCst);
    }

    /// Makes probes hang until turned off again.
    pub fn stall_probes(&self, stall: bool) {
        self.inner.stall_probes.store(stall, Ordering::SeqCst);
    }

    /// Delays every connect by `delay`.
    pub fn set_connect_delay(&self, delay: Duration) {
        *self
            .inner
            .connect_delay
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = delay;
    }

    /// Connections opened so far.
    pub fn connect_count(&self) -> usize {
        self.inner.connects.load(Ordering::SeqCst)
    }

    /// Connections closed by their owner so far.
    pub fn close_count(&self) -> usize {
        self.inner.closes.load(Ordering::SeqCst)
    }

    /// Messages waiting in `queue` (0 if it does not exist).
    pub fn queue_depth(&self, queue: &str) -> usize {
        self.inner
            .queues
            .get(queue)
            .map_or(0, |q| q.messages().len())
    }

    async fn open(&self) -> Result<MemoryConnection, TransportError> {
        let delay = *self
            .inner
            .connect_delay
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if !delay.is_zero() {
            time::sleep(delay).await;
        }

        let refused = self
            .inner
            .fail_connects
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused || !self.is_online() {
            return Err(TransportError::connection("connection refused"));
        }

        let token = self
            .inner
            .link
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .child_token();
        self.inner.connects.fetch_add(1, Ordering::SeqCst);
        Ok(MemoryConnection {
            id: self.inner.next_id.fetch_add(1, Ordering::SeqCst),
            server: self.clone(),
            token,
            closed_locally: Arc::new(AtomicBool::new(false)),
            next_tag: Arc::new(AtomicU64::new(1)),
        })
    }
}

/// One connection to a [`MemoryServer`].
pub struct MemoryConnection {
    id: u64,
    server: MemoryServer,
    token: CancellationToken,
    closed_locally: Arc<AtomicBool>,
    next_tag: Arc<AtomicU64>,
}

impl MemoryConnection {
    /// Connection id, unique per server.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// True until the server dropped it or it was closed.
    pub fn is_open(&self) -> bool {
        !self.token.is_cancelled()
    }

    fn check(&self) -> Result<(), TransportError> {
        if self.closed_locally.load(Ordering::SeqCst) {
            Err(TransportError::Closed)
        } else if self.token.is_cancelled() {
            Err(TransportError::connection("connection reset by peer"))
        } else {
            Ok(())
        }
    }

    fn close(&self) {
        if !self.closed_locally.swap(true, Ordering::SeqCst) {
            self.token.cancel();
            self.server.inner.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn queue(&self, name: &str) -> Result<Arc<Queue>, TransportError> {
        self.server
            .inner
            .queues
            .get(name)
            .map(|q| Arc::clone(q.value()))
            .ok_or_else(|| TransportError::operation(format!("NOT_FOUND - no queue '{name}'")))
    }
}

#[async_trait]
impl CacheOps for MemoryConnection {
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), TransportError> {
        self.check()?;
        let expires_at = (!ttl.is_zero()).then(|| Instant::now() + ttl);
        self.server.inner.entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, TransportError> {
        self.check()?;
        let entries = &self.server.inner.entries;
        let expired = match entries.get(key) {
            None => return Ok(None),
            Some(entry) => match entry.expires_at {
                Some(at) if at <= Instant::now() => true,
                _ => return Ok(Some(entry.value.clone())),
            },
        };
        if expired {
            entries.remove(key);
        }
        Ok(None)
    }

    async fn delete(&self, key: &str) -> Result<(), TransportError> {
        self.check()?;
        self.server.inner.entries.remove(key);
        Ok(())
    }
}

/// Settles deliveries of one memory consumer.
struct MemoryAcker {
    conn_token: CancellationToken,
    queue: Arc<Queue>,
    unacked: DashMap<u64, Message>,
}

impl MemoryAcker {
    fn requeue_all(&self) {
        let tags: Vec<u64> = self.unacked.iter().map(|e| *e.key()).collect();
        for tag in tags.into_iter().rev() {
            if let Some((_, mut message)) = self.unacked.remove(&tag) {
                message.redelivered = true;
                self.queue.push_front(message);
            }
        }
    }
}

#[async_trait]
impl Acknowledge for MemoryAcker {
    async fn ack(&self, delivery_tag: u64) -> Result<(), TransportError> {
        if self.conn_token.is_cancelled() {
            return Err(TransportError::Closed);
        }
        self.unacked
            .remove(&delivery_tag)
            .map(|_| ())
            .ok_or_else(|| {
                TransportError::operation(format!("unknown delivery tag {delivery_tag}"))
            })
    }

    async fn nack(&self, delivery_tag: u64, requeue: bool) -> Result<(), TransportError> {
        if self.conn_token.is_cancelled() {
            return Err(TransportError::Closed);
        }
        let (_, mut message) = self.unacked.remove(&delivery_tag).ok_or_else(|| {
            TransportError::operation(format!("unknown delivery tag {delivery_tag}"))
        })?;
        if requeue {
            message.redelivered = true;
            self.queue.push_front(message);
        }
        Ok(())
    }
}

/// Live consumer state; requeues unsettled messages when the stream goes away.
struct Consumer {
    queue: Arc<Queue>,
    acker: Arc<MemoryAcker>,
    token: CancellationToken,
    auto_ack: bool,
    next_tag: Arc<AtomicU64>,
}

impl Consumer {
    async fn next(&self) -> Option<Delivery> {
        loop {
            if self.token.is_cancelled() {
                return None;
            }
            if let Some(message) = self.queue.pop() {
                return Some(self.deliver(message));
            }
            tokio::select! {
                _ = self.token.cancelled() => return None,
                _ = self.queue.ready.notified() => {}
            }
        }
    }

    fn deliver(&self, message: Message) -> Delivery {
        let tag = self.next_tag.fetch_add(1, Ordering::SeqCst);
        if !self.auto_ack {
            self.acker.unacked.insert(tag, message.clone());
        }
        let acker: Arc<dyn Acknowledge> = self.acker.clone();
        Delivery::new(tag, message.exchange, message.routing_key, message.body, acker)
            .with_headers(message.headers)
            .redelivered(message.redelivered)
    }
}

impl Drop for Consumer {
    fn drop(&mut self) {
        self.queue.consumers.fetch_sub(1, Ordering::SeqCst);
        self.acker.requeue_all();
    }
}

#[async_trait]
impl BrokerOps for MemoryConnection {
    async fn declare_queue(&self, spec: &QueueSpec) -> Result<QueueInfo, TransportError> {
        self.check()?;
        let name = if spec.name.is_empty() {
            format!("amq.gen-{}-{}", self.id, self.next_tag.fetch_add(1, Ordering::SeqCst))
        } else {
            spec.name.clone()
        };
        let queue = Arc::clone(self.server.inner.queues.entry(name.clone()).or_default().value());
        Ok(QueueInfo {
            name,
            message_count: u32::try_from(queue.messages().len()).unwrap_or(u32::MAX),
            consumer_count: queue.consumers.load(Ordering::SeqCst),
        })
    }

    async fn publish(&self, message: &Publish) -> Result<(), TransportError> {
        self.check()?;
        if !message.exchange.is_empty() {
            return Err(TransportError::operation(format!(
                "NOT_FOUND - no exchange '{}'",
                message.exchange
            )));
        }
        self.queue(&message.routing_key)?.push_back(Message {
            exchange: message.exchange.clone(),
            routing_key: message.routing_key.clone(),
            body: message.body.clone(),
            headers: message.headers.clone(),
            redelivered: false,
        });
        Ok(())
    }

    async fn consume(
        &self,
        queue: &str,
        options: &ConsumeOptions,
    ) -> Result<DeliveryStream, TransportError> {
        self.check()?;
        let queue = self.queue(queue)?;
        queue.consumers.fetch_add(1, Ordering::SeqCst);

        let consumer = Consumer {
            acker: Arc::new(MemoryAcker {
                conn_token: self.token.clone(),
                queue: Arc::clone(&queue),
                unacked: DashMap::new(),
            }),
            queue,
            token: self.token.clone(),
            auto_ack: options.auto_ack,
            next_tag: Arc::clone(&self.next_tag),
        };
        let deliveries = futures::stream::unfold(consumer, |consumer| async move {
            let delivery = consumer.next().await?;
            Some((Ok(delivery), consumer))
        });
        Ok(deliveries.boxed())
    }
}

/// Connects to a [`MemoryServer`].
#[derive(Clone)]
pub struct MemoryConnector {
    server: MemoryServer,
    kind: BackendKind,
    name: &'static str,
    health: HealthStrategy,
}

impl MemoryConnector {
    /// A polling cache connector named `"memory"`.
    pub fn new(server: MemoryServer) -> Self {
        Self {
            server,
            kind: BackendKind::Cache,
            name: "memory",
            health: HealthStrategy::Polling,
        }
    }

    /// Reports itself as a different backend kind.
    pub fn with_kind(mut self, kind: BackendKind) -> Self {
        self.kind = kind;
        self
    }

    /// Sets the name used in events and errors.
    pub fn named(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    /// Detects failures from the connection close signal instead of probes.
    pub fn event_driven(mut self) -> Self {
        self.health = HealthStrategy::EventDriven;
        self
    }

    /// The server this connector talks to.
    pub fn server(&self) -> &MemoryServer {
        &self.server
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    type Handle = MemoryConnection;

    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn name(&self) -> &'static str {
        self.name
    }

    fn health(&self) -> HealthStrategy {
        self.health
    }

    async fn connect(&self) -> Result<MemoryConnection, TransportError> {
        self.server.open().await
    }

    async fn probe(&self, handle: &MemoryConnection) -> Result<(), TransportError> {
        if self.server.inner.stall_probes.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        handle.check()
    }

    async fn close(&self, handle: &MemoryConnection) {
        handle.close();
    }

    async fn closed(&self, handle: &MemoryConnection) {
        handle.token.cancelled().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire_after_ttl() {
        let server = MemoryServer::new();
        let conn = server.open().await.expect("connect");

        conn.set("a", "1", Duration::from_secs(1)).await.expect("set");
        assert_eq!(conn.get("a").await.expect("get"), Some("1".to_string()));

        time::advance(Duration::from_millis(1001)).await;
        assert_eq!(conn.get("a").await.expect("get"), None);
    }

    #[tokio::test]
    async fn test_outage_kills_open_connections_but_keeps_data() {
        let server = MemoryServer::new();
        let conn = server.open().await.expect("connect");
        conn.set("k", "v", Duration::ZERO).await.expect("set");

        server.go_offline();
        assert!(!conn.is_open());
        assert!(conn.get("k").await.expect_err("dead").is_connectivity());
        assert!(server.open().await.is_err());

        server.go_online();
        let fresh = server.open().await.expect("reconnect");
        assert_eq!(fresh.get("k").await.expect("get"), Some("v".to_string()));
        assert!(!conn.is_open());
    }

    #[tokio::test]
    async fn test_fail_next_connects_counts_down() {
        let server = MemoryServer::new();
        server.fail_next_connects(2);
        assert!(server.open().await.is_err());
        assert!(server.open().await.is_err());
        assert!(server.open().await.is_ok());
        assert_eq!(server.connect_count(), 1);
    }

    #[tokio::test]
    async fn test_nacked_message_is_redelivered() {
        let server = MemoryServer::new();
        let conn = server.open().await.expect("connect");
        conn.declare_queue(&QueueSpec::durable("jobs"))
            .await
            .expect("declare");
        conn.publish(&Publish::to_queue("jobs", "hello"))
            .await
            .expect("publish");

        let mut stream = conn
            .consume("jobs", &ConsumeOptions::default())
            .await
            .expect("consume");
        let first = stream.next().await.expect("item").expect("delivery");
        assert!(!first.redelivered);
        first.nack(true).await.expect("nack");

        let second = stream.next().await.expect("item").expect("delivery");
        assert!(second.redelivered);
        assert_eq!(second.body, b"hello");
        second.ack().await.expect("ack");
        assert_eq!(server.queue_depth("jobs"), 0);
    }

    #[tokio::test]
    async fn test_unacked_messages_return_when_consumer_dies() {
        let server = MemoryServer::new();
        let conn = server.open().await.expect("connect");
        conn.declare_queue(&QueueSpec::durable("jobs"))
            .await
            .expect("declare");
        conn.publish(&Publish::to_queue("jobs", "once"))
            .await
            .expect("publish");

        let mut stream = conn
            .consume("jobs", &ConsumeOptions::default())
            .await
            .expect("consume");
        let delivery = stream.next().await.expect("item").expect("delivery");

        server.go_offline();
        assert!(stream.next().await.is_none());
        drop(stream);
        assert!(delivery.ack().await.is_err());
        assert_eq!(server.queue_depth("jobs"), 1);
    }

    #[tokio::test]
    async fn test_publish_to_unknown_queue_is_operation_error() {
        let server = MemoryServer::new();
        let conn = server.open().await.expect("connect");
        let err = conn
            .publish(&Publish::to_queue("missing", "x"))
            .await
            .expect_err("no queue");
        assert!(!err.is_connectivity());
    }
}
