//! # Supervisor: owner of one live backend handle.
//!
//! A [`Supervisor`] keeps exactly one handle of its [`Connector`] installed, hands it
//! out through [`Supervisor::acquire`] and replaces it in the background when it dies.
//!
//! ## Architecture
//! ```text
//!                       ┌──────────── Shared<C> ─────────────┐
//! callers ── acquire() ─┤ RwLock<Slot> { current, gen, phase }│◄── swap / withdraw ── worker task
//!                       │ watch<Status>   Bus   token        │        (health + reconnect)
//!                       └────────────────────────────────────┘
//!                                         │ events
//!                                         ▼
//!                                 listener ──► SubscriberSet ──► LogWriter, ...
//! ```
//!
//! ## Rules
//! - One background worker per supervisor, from construction until `shutdown()`.
//! - The slot lock is never held across a connect, probe or close.
//! - Replace-then-close: a handle is closed only after it left the slot.
//! - Generation starts at 1 and grows by one per installed handle.
//! - After `shutdown()` starts, `acquire()` fails with [`SupervisorError::Closed`].
//!
//! ## Example
//! ```rust
//! use linkvisor::backends::memory::{MemoryConnector, MemoryServer};
//! use linkvisor::{Supervisor, SupervisorConfig};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), linkvisor::SupervisorError> {
//! let server = MemoryServer::new();
//! let sup = Supervisor::connect(MemoryConnector::new(server), SupervisorConfig::default()).await?;
//!
//! let lease = sup.acquire().await?;
//! assert_eq!(lease.generation(), 1);
//!
//! sup.shutdown().await;
//! assert!(sup.acquire().await.is_err());
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::select;
use tokio::sync::{Mutex, Notify, RwLock, broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

use crate::core::builder::SupervisorBuilder;
use crate::core::config::SupervisorConfig;
use crate::core::state::{Lease, Phase, Slot, Status};
use crate::error::{SupervisorError, TransportError};
use crate::events::{Bus, Event, EventKind};
use crate::transport::{BackendKind, Connector, Transport};

/// State shared between the supervisor facade and its worker task.
pub(crate) struct Shared<C: Connector> {
    pub(crate) connector: C,
    pub(crate) name: &'static str,
    pub(crate) kind: BackendKind,
    pub(crate) cfg: SupervisorConfig,
    pub(crate) slot: RwLock<Slot<C::Handle>>,
    pub(crate) status: watch::Sender<Status>,
    pub(crate) bus: Bus,
    pub(crate) token: CancellationToken,
    /// Set as soon as `shutdown()` is entered.
    pub(crate) closing: AtomicBool,
    /// Probe requests from callers that saw a connectivity error.
    pub(crate) suspect: Notify,
    /// Wakes a degraded worker.
    pub(crate) rearm: Notify,
    /// True while the worker task is alive.
    pub(crate) running: AtomicBool,
}

impl<C: Connector> Shared<C> {
    pub(crate) fn new(
        connector: C,
        cfg: SupervisorConfig,
        bus: Bus,
        first: Transport<C::Handle>,
    ) -> Self {
        let slot = Slot::new(first);
        let (status, _) = watch::channel(slot.status());
        Self {
            name: connector.name(),
            kind: connector.kind(),
            connector,
            cfg,
            slot: RwLock::new(slot),
            status,
            bus,
            token: CancellationToken::new(),
            closing: AtomicBool::new(false),
            suspect: Notify::new(),
            rearm: Notify::new(),
            running: AtomicBool::new(false),
        }
    }

    /// Publishes an event tagged with this backend's name.
    pub(crate) fn publish(&self, ev: Event) {
        self.bus.publish(ev.with_backend(self.name));
    }

    /// Currently installed handle, if any.
    pub(crate) async fn current(&self) -> Option<Arc<Transport<C::Handle>>> {
        self.slot.read().await.current.clone()
    }

    /// Sets the phase of an empty slot.
    pub(crate) async fn set_phase(&self, phase: Phase) {
        let mut slot = self.slot.write().await;
        slot.phase = phase;
        self.status.send_replace(slot.status());
    }

    /// Installs a fresh handle and closes the one it replaced. Returns the new generation.
    pub(crate) async fn swap(&self, handle: C::Handle) -> u64 {
        let (previous, generation) = {
            let mut slot = self.slot.write().await;
            let previous = slot.install(handle, self.kind);
            self.status.send_replace(slot.status());
            (previous, slot.generation)
        };
        if let Some(previous) = previous {
            self.close(&previous).await;
        }
        generation
    }

    /// Removes a dead handle from the slot and closes it.
    pub(crate) async fn withdraw(&self, dead: &Arc<Transport<C::Handle>>, reason: String) {
        let removed = {
            let mut slot = self.slot.write().await;
            let removed = slot.withdraw(dead.generation());
            self.status.send_replace(slot.status());
            removed
        };
        let Some(removed) = removed else {
            return;
        };
        self.publish(
            Event::new(EventKind::ConnectionLost)
                .with_generation(removed.generation())
                .with_reason(reason),
        );
        self.close(&removed).await;
    }

    pub(crate) async fn close(&self, transport: &Transport<C::Handle>) {
        self.close_raw(transport.get()).await;
    }

    /// Closes a handle, bounded by `connect_timeout`.
    pub(crate) async fn close_raw(&self, handle: &C::Handle) {
        let timeout = self.cfg.connect_timeout;
        if time::timeout(timeout, self.connector.close(handle)).await.is_err() {
            tracing::warn!(
                backend = self.name,
                timeout_ms = timeout.as_millis() as u64,
                "close timed out"
            );
        }
    }
}

/// Background tasks owned by a supervisor.
#[derive(Default)]
pub(crate) struct Background {
    pub(crate) worker: Option<JoinHandle<()>>,
    pub(crate) listener: Option<JoinHandle<()>>,
}

/// Keeps one handle of `C` alive and replaces it when it fails.
///
/// See the [module docs](self) for the lifecycle. Construct with
/// [`Supervisor::connect`] or [`SupervisorBuilder`].
pub struct Supervisor<C: Connector> {
    shared: Arc<Shared<C>>,
    background: Mutex<Background>,
}

impl<C: Connector> Supervisor<C> {
    pub(crate) fn new(shared: Arc<Shared<C>>, background: Background) -> Self {
        Self {
            shared,
            background: Mutex::new(background),
        }
    }

    /// Starts a builder for `connector`.
    pub fn builder(connector: C) -> SupervisorBuilder<C> {
        SupervisorBuilder::new(connector)
    }

    /// Connects with `cfg` and the default subscribers.
    ///
    /// With the `logging` feature the default subscribers are a single
    /// [`LogWriter`](crate::LogWriter); without it there are none.
    ///
    /// # Errors
    /// [`SupervisorError::ConnectFailed`] if the first handle cannot be established within
    /// `cfg.connect_timeout`. Nothing is left running in that case.
    pub async fn connect(connector: C, cfg: SupervisorConfig) -> Result<Self, SupervisorError> {
        let builder = SupervisorBuilder::new(connector).config(cfg);
        #[cfg(feature = "logging")]
        let builder =
            builder.with_subscribers(vec![Arc::new(crate::subscribers::LogWriter::new())]);
        builder.connect().await
    }

    /// Returns a lease on the handle installed right now.
    ///
    /// While a reconnect is in progress this waits up to `acquire_timeout` for the new
    /// handle (`0s` fails fast).
    ///
    /// # Errors
    /// - [`SupervisorError::Unavailable`] no handle within the wait budget
    /// - [`SupervisorError::Degraded`] reconnect attempts exhausted
    /// - [`SupervisorError::Closed`] shutdown started
    pub async fn acquire(&self) -> Result<Lease<C::Handle>, SupervisorError> {
        let shared = &self.shared;
        let mut changes = shared.status.subscribe();
        let deadline = Instant::now() + shared.cfg.acquire_timeout;

        loop {
            if shared.closing.load(Ordering::Acquire) {
                return Err(self.closed());
            }
            {
                let slot = shared.slot.read().await;
                match (&slot.current, slot.phase) {
                    (Some(current), _) => return Ok(Lease::new(Arc::clone(current))),
                    (None, Phase::Closed) => return Err(self.closed()),
                    (None, Phase::Degraded { attempts }) => {
                        return Err(SupervisorError::Degraded {
                            backend: shared.name,
                            attempts,
                        });
                    }
                    (None, _) => {}
                }
            }

            let Some(wait) = shared.cfg.acquire_wait() else {
                return Err(self.unavailable("reconnect in progress".to_string()));
            };
            select! {
                _ = shared.token.cancelled() => return Err(self.closed()),
                res = time::timeout_at(deadline, changes.changed()) => match res {
                    Ok(Ok(())) => continue,
                    Ok(Err(_)) => return Err(self.closed()),
                    Err(_) => {
                        return Err(self.unavailable(format!("no connection within {wait:?}")));
                    }
                },
            }
        }
    }

    /// Runs one backend call on a fresh lease and classifies its error.
    ///
    /// Connectivity errors are reported with [`Supervisor::report_suspect`] and
    /// returned as [`SupervisorError::Unavailable`]; other backend errors as
    /// [`SupervisorError::OperationFailed`]. The call is never retried.
    pub async fn with_lease<T, F, Fut>(&self, op: F) -> Result<T, SupervisorError>
    where
        F: FnOnce(Lease<C::Handle>) -> Fut,
        Fut: Future<Output = Result<T, TransportError>>,
    {
        let lease = self.acquire().await?;
        let generation = lease.generation();
        op(lease).await.map_err(|err| {
            if err.is_connectivity() {
                self.report_suspect(generation);
            }
            SupervisorError::from_transport(self.shared.name, err)
        })
    }

    /// Asks the worker to probe now because a caller saw a connectivity error.
    ///
    /// Ignored unless `generation` is the installed one. The report itself never
    /// tears the handle down; only a failed probe does.
    pub fn report_suspect(&self, generation: u64) {
        let status = *self.shared.status.borrow();
        if !status.is_healthy() || status.generation != generation {
            return;
        }
        self.shared
            .publish(Event::new(EventKind::SuspectReported).with_generation(generation));
        self.shared.suspect.notify_one();
    }

    /// Restarts the reconnect cycle of a degraded supervisor.
    ///
    /// Returns `false` (and does nothing) if the supervisor is not degraded.
    pub async fn rearm(&self) -> bool {
        {
            let mut slot = self.shared.slot.write().await;
            if !matches!(slot.phase, Phase::Degraded { .. }) {
                return false;
            }
            slot.phase = Phase::Reconnecting;
            self.shared.status.send_replace(slot.status());
        }
        self.shared.publish(Event::new(EventKind::Rearmed));
        self.shared.rearm.notify_one();
        true
    }

    /// Stops the worker and closes the installed handle.
    ///
    /// Idempotent: a second caller waits for the first to finish and returns.
    /// In-flight operations on existing leases are not aborted; they fail once the
    /// handle is closed.
    pub async fn shutdown(&self) {
        let shared = &self.shared;
        shared.closing.store(true, Ordering::Release);

        let mut background = self.background.lock().await;
        if shared.status.borrow().phase == Phase::Closed {
            return;
        }
        shared.publish(Event::new(EventKind::ShutdownRequested));
        shared.token.cancel();

        if let Some(worker) = background.worker.take() {
            if let Err(err) = worker.await {
                tracing::error!(backend = shared.name, error = %err, "supervisor worker failed");
            }
        }

        let (last, generation) = {
            let mut slot = shared.slot.write().await;
            let last = slot.current.take();
            slot.phase = Phase::Closed;
            shared.status.send_replace(slot.status());
            (last, slot.generation)
        };
        if let Some(last) = last {
            shared.close(&last).await;
        }
        shared.publish(Event::new(EventKind::Closed).with_generation(generation));

        if let Some(listener) = background.listener.take() {
            let _ = listener.await;
        }
    }

    /// Current phase and generation.
    pub fn status(&self) -> Status {
        *self.shared.status.borrow()
    }

    /// Receiver for status changes.
    ///
    /// A receiver only sees the latest value: transient phases (`Detecting`,
    /// `Reconnecting`) may be coalesced when a reconnect completes quickly. Use
    /// [`Supervisor::events`] to observe every transition.
    pub fn watch(&self) -> watch::Receiver<Status> {
        self.shared.status.subscribe()
    }

    /// Receiver for events published from now on.
    pub fn events(&self) -> broadcast::Receiver<Event> {
        self.shared.bus.subscribe()
    }

    /// True while the background worker is running.
    pub fn is_supervising(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// Generation of the last installed handle.
    pub fn generation(&self) -> u64 {
        self.status().generation
    }

    /// Backend name used in events and errors.
    pub fn backend(&self) -> &'static str {
        self.shared.name
    }

    /// Backend kind.
    pub fn kind(&self) -> BackendKind {
        self.shared.kind
    }

    /// The configuration this supervisor runs with.
    pub fn config(&self) -> &SupervisorConfig {
        &self.shared.cfg
    }

    fn closed(&self) -> SupervisorError {
        SupervisorError::Closed {
            backend: self.shared.name,
        }
    }

    fn unavailable(&self, reason: String) -> SupervisorError {
        SupervisorError::Unavailable {
            backend: self.shared.name,
            reason,
        }
    }
}

impl<C: Connector> Drop for Supervisor<C> {
    /// Stops the worker of a supervisor that was not shut down.
    ///
    /// The handle is dropped without [`Connector::close`]; call
    /// [`Supervisor::shutdown`] for an orderly close.
    fn drop(&mut self) {
        self.shared.token.cancel();
        if let Some(listener) = self.background.get_mut().listener.take() {
            listener.abort();
        }
    }
}

#[cfg(all(test, feature = "inmemory"))]
mod tests {
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::backends::memory::{MemoryConnector, MemoryServer};
    use crate::facades::{Cache, CacheOps};
    use crate::policies::{BackoffPolicy, ReconnectPolicy};
    use crate::subscribers::Subscribe;

    fn test_config() -> SupervisorConfig {
        SupervisorConfig {
            connect_timeout: Duration::from_millis(500),
            health_interval: Duration::from_secs(1),
            probe_timeout: Duration::from_millis(200),
            acquire_timeout: Duration::ZERO,
            reconnect: ReconnectPolicy::unbounded(BackoffPolicy::constant(Duration::from_millis(
                250,
            ))),
            bus_capacity: 256,
        }
    }

    async fn start(server: &MemoryServer, cfg: SupervisorConfig) -> Supervisor<MemoryConnector> {
        Supervisor::builder(MemoryConnector::new(server.clone()))
            .config(cfg)
            .connect()
            .await
            .expect("initial connect")
    }

    async fn wait_status<C: Connector>(
        sup: &Supervisor<C>,
        pred: impl FnMut(&Status) -> bool,
    ) -> Status {
        let mut rx = sup.watch();
        let status = time::timeout(Duration::from_secs(600), rx.wait_for(pred))
            .await
            .expect("status reached in time")
            .expect("status channel open");
        *status
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_failure_returns_connect_failed() {
        let server = MemoryServer::new();
        server.go_offline();

        let err = Supervisor::builder(MemoryConnector::new(server.clone()))
            .config(test_config())
            .connect()
            .await
            .err()
            .expect("connect must fail");
        assert!(matches!(err, SupervisorError::ConnectFailed { .. }));
        assert_eq!(server.connect_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_connect_times_out() {
        let server = MemoryServer::new();
        server.set_connect_delay(Duration::from_secs(5));

        let err = Supervisor::builder(MemoryConnector::new(server))
            .config(test_config())
            .connect()
            .await
            .err()
            .expect("connect must time out");
        match err {
            SupervisorError::ConnectFailed { source, .. } => {
                assert!(matches!(source, TransportError::Timeout { .. }));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fresh_supervisor_is_healthy_at_generation_one() {
        let server = MemoryServer::new();
        let sup = start(&server, test_config()).await;

        let lease = sup.acquire().await.expect("lease");
        assert_eq!(lease.generation(), 1);
        assert!(lease.is_open());
        assert_eq!(
            sup.status(),
            Status {
                phase: Phase::Healthy,
                generation: 1
            }
        );
        assert!(sup.is_supervising());
        sup.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_outage_is_detected_and_recovered() {
        let server = MemoryServer::new();
        let sup = Arc::new(start(&server, test_config()).await);
        let cache = Cache::new(Arc::clone(&sup));
        cache.set("k", "v", Duration::ZERO).await.expect("set");

        server.go_offline();
        let started = Instant::now();
        let status = wait_status(&sup, |s| !s.is_healthy()).await;
        assert!(started.elapsed() <= Duration::from_secs(1) + Duration::from_millis(200));
        assert_eq!(status.generation, 1);

        let err = cache.get("k").await.expect_err("gap");
        assert!(matches!(err, SupervisorError::Unavailable { .. }));

        server.go_online();
        let status = wait_status(&sup, |s| s.is_healthy()).await;
        assert_eq!(status.generation, 2);
        assert_eq!(cache.get("k").await.expect("get"), Some("v".to_string()));

        // The dead handle was closed after being withdrawn.
        assert_eq!(server.close_count(), 1);
        sup.shutdown().await;
        assert_eq!(server.close_count(), server.connect_count());
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_health_interval_still_detects_outages() {
        let server = MemoryServer::new();
        let cfg = SupervisorConfig {
            health_interval: Duration::ZERO,
            ..test_config()
        };
        let sup = start(&server, cfg).await;

        time::sleep(Duration::from_secs(1)).await;
        assert!(sup.is_supervising());

        server.go_offline();
        wait_status(&sup, |s| s.phase == Phase::Reconnecting).await;
        assert!(sup.acquire().await.is_err());

        server.go_online();
        assert_eq!(wait_status(&sup, |s| s.is_healthy()).await.generation, 2);
        assert!(sup.is_supervising());
        sup.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_waits_for_reconnect_within_budget() {
        let server = MemoryServer::new();
        let cfg = SupervisorConfig {
            acquire_timeout: Duration::from_secs(5),
            ..test_config()
        };
        let sup = start(&server, cfg).await;

        server.go_offline();
        wait_status(&sup, |s| s.phase == Phase::Reconnecting).await;
        server.go_online();

        let lease = sup.acquire().await.expect("lease after reconnect");
        assert_eq!(lease.generation(), 2);
        sup.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_gives_up_after_budget() {
        let server = MemoryServer::new();
        let cfg = SupervisorConfig {
            acquire_timeout: Duration::from_secs(1),
            ..test_config()
        };
        let sup = start(&server, cfg).await;

        server.go_offline();
        wait_status(&sup, |s| s.phase == Phase::Reconnecting).await;

        let started = Instant::now();
        let err = sup.acquire().await.expect_err("still offline");
        assert!(err.is_retryable());
        assert!(started.elapsed() >= Duration::from_secs(1));
        sup.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounded_retries_degrade_until_rearm() {
        let server = MemoryServer::new();
        let sup = start(&server, test_config().with_max_attempts(3)).await;
        let mut events = sup.events();

        server.go_offline();
        let status = wait_status(&sup, |s| matches!(s.phase, Phase::Degraded { .. })).await;
        assert_eq!(status.phase, Phase::Degraded { attempts: 3 });

        let mut failed = 0;
        while let Ok(ev) = events.try_recv() {
            if ev.kind == EventKind::ReconnectFailed {
                failed += 1;
            }
        }
        assert_eq!(failed, 3);

        server.go_online();
        time::sleep(Duration::from_secs(60)).await;
        for _ in 0..2 {
            match sup.acquire().await {
                Err(SupervisorError::Degraded { attempts, .. }) => assert_eq!(attempts, 3),
                other => panic!("expected degraded, got {other:?}"),
            }
        }
        assert_eq!(server.connect_count(), 1);

        assert!(sup.rearm().await);
        let status = wait_status(&sup, |s| s.is_healthy()).await;
        assert_eq!(status.generation, 2);
        assert!(!sup.rearm().await);
        sup.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_during_reconnect_is_prompt_and_idempotent() {
        let server = MemoryServer::new();
        let sup = start(&server, test_config()).await;

        server.go_offline();
        wait_status(&sup, |s| s.phase == Phase::Reconnecting).await;

        let started = Instant::now();
        tokio::join!(sup.shutdown(), sup.shutdown());
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(!sup.is_supervising());
        assert_eq!(sup.status().phase, Phase::Closed);
        assert!(matches!(
            sup.acquire().await,
            Err(SupervisorError::Closed { .. })
        ));

        sup.shutdown().await;
        assert_eq!(sup.status().phase, Phase::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovery_after_failed_connects_is_bounded() {
        const FAILURES: u32 = 3;
        let cfg = test_config();
        let bound = (cfg.connect_timeout + Duration::from_millis(250)) * FAILURES
            + cfg.health_interval
            + cfg.probe_timeout;

        let server = MemoryServer::new();
        let sup = start(&server, cfg).await;
        let mut events = sup.events();

        server.fail_next_connects(FAILURES);
        server.go_offline();
        server.go_online();
        let outage = Instant::now();

        let status = wait_status(&sup, |s| s.is_healthy() && s.generation > 1).await;
        assert!(
            outage.elapsed() <= bound,
            "recovered after {:?}, bound {bound:?}",
            outage.elapsed()
        );
        assert_eq!(status.generation, 2);
        assert_eq!(server.connect_count(), 2);

        let mut failed = 0;
        while let Ok(ev) = events.try_recv() {
            if ev.kind == EventKind::ReconnectFailed {
                failed += 1;
            }
        }
        assert_eq!(failed, FAILURES);
        sup.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cancels_connect_in_flight() {
        let server = MemoryServer::new();
        let cfg = SupervisorConfig {
            connect_timeout: Duration::from_secs(30),
            ..test_config()
        };
        let sup = start(&server, cfg).await;
        let mut events = sup.events();

        server.set_connect_delay(Duration::from_secs(5));
        server.go_offline();
        wait_status(&sup, |s| s.phase == Phase::Reconnecting).await;
        time::sleep(Duration::from_millis(100)).await;

        let started = Instant::now();
        sup.shutdown().await;
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(!sup.is_supervising());
        assert_eq!(sup.status().phase, Phase::Closed);
        assert_eq!(server.connect_count(), 1);

        let mut kinds = Vec::new();
        while let Ok(ev) = events.try_recv() {
            kinds.push(ev.kind);
        }
        assert!(kinds.contains(&EventKind::ReconnectStarting));
        assert!(!kinds.contains(&EventKind::ReconnectFailed));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_closes_installed_handle() {
        let server = MemoryServer::new();
        let sup = start(&server, test_config()).await;
        let lease = sup.acquire().await.expect("lease");

        sup.shutdown().await;
        assert!(!lease.is_open());
        assert!(lease.get("k").await.is_err());
        assert_eq!(server.close_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_event_driven_detection_skips_polling() {
        let server = MemoryServer::new();
        let cfg = SupervisorConfig {
            health_interval: Duration::from_secs(3600),
            ..test_config()
        };
        let sup = Supervisor::builder(MemoryConnector::new(server.clone()).event_driven())
            .config(cfg)
            .connect()
            .await
            .expect("connect");

        let started = Instant::now();
        server.go_offline();
        wait_status(&sup, |s| !s.is_healthy()).await;
        assert!(started.elapsed() < Duration::from_secs(1));

        server.go_online();
        assert_eq!(wait_status(&sup, |s| s.is_healthy()).await.generation, 2);
        sup.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_suspect_report_triggers_immediate_probe() {
        let server = MemoryServer::new();
        let cfg = SupervisorConfig {
            health_interval: Duration::from_secs(3600),
            ..test_config()
        };
        let sup = Arc::new(start(&server, cfg).await);
        let cache = Cache::new(Arc::clone(&sup));
        let mut events = sup.events();

        let started = Instant::now();
        server.go_offline();
        let err = cache.get("k").await.expect_err("dead connection");
        assert!(err.is_retryable());

        wait_status(&sup, |s| !s.is_healthy()).await;
        assert!(started.elapsed() < Duration::from_secs(1));

        let mut kinds = Vec::new();
        while let Ok(ev) = events.try_recv() {
            kinds.push(ev.kind);
        }
        assert!(kinds.contains(&EventKind::SuspectReported));
        assert!(kinds.contains(&EventKind::ProbeFailed));
        sup.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_suspect_report_is_ignored() {
        let server = MemoryServer::new();
        let sup = start(&server, test_config()).await;
        let mut events = sup.events();

        sup.report_suspect(7);
        assert!(events.try_recv().is_err());
        sup.shutdown().await;
    }

    async fn next_of(events: &mut broadcast::Receiver<Event>, kind: EventKind) -> Event {
        let wait = async {
            loop {
                let ev = events.recv().await.expect("event bus open");
                if ev.kind == kind {
                    return ev;
                }
            }
        };
        time::timeout(Duration::from_secs(600), wait)
            .await
            .expect("event arrived in time")
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_timeout_counts_as_failure() {
        let server = MemoryServer::new();
        let sup = start(&server, test_config()).await;
        let mut events = sup.events();

        server.stall_probes(true);
        let probe_failed = next_of(&mut events, EventKind::ProbeFailed).await;
        assert_eq!(probe_failed.timeout_ms, Some(200));
        assert_eq!(probe_failed.generation, Some(1));

        let lost = next_of(&mut events, EventKind::ConnectionLost).await;
        assert_eq!(lost.generation, Some(1));
        let back = next_of(&mut events, EventKind::Reconnected).await;
        assert_eq!(back.generation, Some(2));
        server.stall_probes(false);

        assert!(sup.generation() >= 2);
        assert!(sup.acquire().await.expect("lease").generation() >= 2);
        sup.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_operation_errors_do_not_trigger_reconnect() {
        let server = MemoryServer::new();
        let sup = Arc::new(start(&server, test_config()).await);
        let broker = crate::facades::Broker::new(Arc::clone(&sup));

        let err = broker
            .publish(&crate::facades::Publish::to_queue("missing", "x"))
            .await
            .expect_err("no such queue");
        assert!(matches!(err, SupervisorError::OperationFailed { .. }));

        time::sleep(Duration::from_secs(5)).await;
        assert_eq!(sup.status().generation, 1);
        assert!(sup.status().is_healthy());
        sup.shutdown().await;
    }

    struct Recorder(Arc<StdMutex<Vec<EventKind>>>);

    #[async_trait]
    impl Subscribe for Recorder {
        async fn on_event(&self, event: &Event) {
            self.0
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .push(event.kind);
        }

        fn name(&self) -> &'static str {
            "recorder"
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscribers_see_full_lifecycle() {
        let server = MemoryServer::new();
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let sup = Supervisor::builder(MemoryConnector::new(server.clone()))
            .config(test_config())
            .with_subscribers(vec![Arc::new(Recorder(Arc::clone(&seen)))])
            .connect()
            .await
            .expect("connect");

        server.go_offline();
        wait_status(&sup, |s| !s.is_healthy()).await;
        server.go_online();
        wait_status(&sup, |s| s.is_healthy()).await;
        sup.shutdown().await;

        let seen = seen.lock().expect("recorder lock").clone();
        assert_eq!(seen.first(), Some(&EventKind::Connected));
        assert_eq!(seen.last(), Some(&EventKind::Closed));
        for kind in [
            EventKind::ProbeFailed,
            EventKind::ConnectionLost,
            EventKind::ReconnectStarting,
            EventKind::Reconnected,
            EventKind::ShutdownRequested,
        ] {
            assert!(seen.contains(&kind), "missing {kind:?} in {seen:?}");
        }
        let lost = seen.iter().position(|k| *k == EventKind::ConnectionLost);
        let back = seen.iter().position(|k| *k == EventKind::Reconnected);
        assert!(lost < back);
    }
}
