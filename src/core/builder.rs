use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio::time;

use crate::{
    core::{
        SupervisorConfig,
        supervisor::{Background, Shared, Supervisor},
        worker,
    },
    error::{SupervisorError, TransportError},
    events::{Bus, Event, EventKind},
    subscribers::{Subscribe, SubscriberSet},
    transport::{Connector, Transport},
};

/// Builder for constructing a [`Supervisor`] with optional subscribers.
pub struct SupervisorBuilder<C: Connector> {
    connector: C,
    cfg: SupervisorConfig,
    subscribers: Vec<Arc<dyn Subscribe>>,
}

impl<C: Connector> SupervisorBuilder<C> {
    /// Creates a builder with the default configuration and no subscribers.
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            cfg: SupervisorConfig::default(),
            subscribers: Vec::new(),
        }
    }

    /// Sets the supervisor configuration.
    pub fn config(mut self, cfg: SupervisorConfig) -> Self {
        self.cfg = cfg;
        self
    }

    /// Sets event subscribers for observability.
    ///
    /// Subscribers receive supervisor events (reconnects, probe failures, etc.)
    /// through dedicated workers with bounded queues.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Establishes the first handle and starts supervising it.
    ///
    /// On failure nothing is spawned and the connector is dropped.
    ///
    /// # Errors
    /// [`SupervisorError::ConnectFailed`] if `connect()` fails or exceeds `connect_timeout`.
    pub async fn connect(self) -> Result<Supervisor<C>, SupervisorError> {
        let backend = self.connector.name();
        let kind = self.connector.kind();
        let timeout = self.cfg.connect_timeout;

        let handle = match time::timeout(timeout, self.connector.connect()).await {
            Ok(Ok(handle)) => handle,
            Ok(Err(source)) => return Err(SupervisorError::ConnectFailed { backend, source }),
            Err(_) => {
                return Err(SupervisorError::ConnectFailed {
                    backend,
                    source: TransportError::Timeout { timeout },
                });
            }
        };

        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let listener = if self.subscribers.is_empty() {
            None
        } else {
            Some(subscriber_listener(self.subscribers, bus.clone()))
        };

        let first = Transport::new(handle, kind, 1);
        let shared = Arc::new(Shared::new(self.connector, self.cfg, bus, first));
        shared.publish(Event::new(EventKind::Connected).with_generation(1));

        shared
            .running
            .store(true, std::sync::atomic::Ordering::Release);
        let worker = tokio::spawn(worker::run(Arc::clone(&shared)));

        Ok(Supervisor::new(
            shared,
            Background {
                worker: Some(worker),
                listener,
            },
        ))
    }
}

/// Forwards bus events to the subscriber set until the `Closed` event.
fn subscriber_listener(subscribers: Vec<Arc<dyn Subscribe>>, bus: Bus) -> JoinHandle<()> {
    let mut rx = bus.subscribe();
    let set = SubscriberSet::new(subscribers, bus);
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(ev) => {
                    set.emit(&ev);
                    if ev.kind == EventKind::Closed {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event listener lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
        set.shutdown().await;
    })
}
