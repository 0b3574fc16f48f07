//! # Supervisor worker task.
//!
//! The single background task of a supervisor. It alternates between watching the
//! installed handle and replacing it.
//!
//! ```text
//! loop {
//!   ├─► handle installed? ── wait_for_failure() ── cancelled → break
//!   │                              │
//!   │                              └─► withdraw (Detecting) + close outside the lock
//!   ├─► phase = Reconnecting
//!   └─► reconnect()
//!         ├─► Installed    → continue
//!         ├─► Cancelled    → break
//!         └─► Exhausted(n) → phase = Degraded { n }, wait for rearm() or cancel
//! }
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::select;

use crate::core::health::wait_for_failure;
use crate::core::reconnect::{Outcome, reconnect};
use crate::core::state::Phase;
use crate::core::supervisor::Shared;
use crate::events::{Event, EventKind};
use crate::transport::Connector;

/// Clears the `running` flag when the worker exits, panics included.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub(crate) async fn run<C: Connector>(shared: Arc<Shared<C>>) {
    let _running = RunningGuard(&shared.running);

    loop {
        if let Some(transport) = shared.current().await {
            let Some(reason) = wait_for_failure(&shared, &transport).await else {
                break;
            };
            tracing::debug!(
                backend = shared.name,
                generation = transport.generation(),
                %reason,
                "handle failed"
            );
            shared.withdraw(&transport, reason).await;
        }

        if shared.token.is_cancelled() {
            break;
        }
        shared.set_phase(Phase::Reconnecting).await;

        match reconnect(&shared).await {
            Outcome::Installed => continue,
            Outcome::Cancelled => break,
            Outcome::Exhausted(attempts) => {
                shared.set_phase(Phase::Degraded { attempts }).await;
                shared.publish(Event::new(EventKind::Degraded).with_attempt(attempts));
                select! {
                    _ = shared.token.cancelled() => break,
                    _ = shared.rearm.notified() => {}
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use crate::core::{Phase, Supervisor, SupervisorConfig};
    use crate::error::TransportError;
    use crate::policies::{BackoffPolicy, ReconnectPolicy};
    use crate::transport::{BackendKind, Connector};

    struct ScriptedHandle {
        id: u64,
        open: AtomicBool,
    }

    /// Hands out numbered handles and fails the probe of every handle whose id is
    /// at most `kill_through`.
    #[derive(Default)]
    struct Scripted {
        next_id: AtomicU64,
        kill_through: Arc<AtomicU64>,
        live: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Connector for Scripted {
        type Handle = ScriptedHandle;

        fn kind(&self) -> BackendKind {
            BackendKind::Relational
        }

        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn connect(&self) -> Result<ScriptedHandle, TransportError> {
            self.live.fetch_add(1, Ordering::SeqCst);
            Ok(ScriptedHandle {
                id: self.next_id.fetch_add(1, Ordering::SeqCst) + 1,
                open: AtomicBool::new(true),
            })
        }

        async fn probe(&self, handle: &ScriptedHandle) -> Result<(), TransportError> {
            if handle.id <= self.kill_through.load(Ordering::SeqCst) {
                Err(TransportError::connection("killed"))
            } else {
                Ok(())
            }
        }

        async fn close(&self, handle: &ScriptedHandle) {
            if handle.open.swap(false, Ordering::SeqCst) {
                self.live.fetch_sub(1, Ordering::SeqCst);
            }
        }
    }

    fn fast_config() -> SupervisorConfig {
        SupervisorConfig {
            connect_timeout: Duration::from_millis(100),
            health_interval: Duration::from_millis(100),
            probe_timeout: Duration::from_millis(50),
            acquire_timeout: Duration::from_millis(500),
            reconnect: ReconnectPolicy::unbounded(BackoffPolicy::constant(Duration::from_millis(
                10,
            ))),
            bus_capacity: 16,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_leases_are_never_closed_handles_and_nothing_leaks() {
        let live = Arc::new(AtomicUsize::new(0));
        let kill_through = Arc::new(AtomicU64::new(0));
        let connector = Scripted {
            live: Arc::clone(&live),
            kill_through: Arc::clone(&kill_through),
            ..Scripted::default()
        };
        let sup = Supervisor::builder(connector)
            .config(fast_config())
            .connect()
            .await
            .expect("connect");

        let mut last_generation = 0;
        for round in 1..=5_u64 {
            kill_through.store(round, Ordering::SeqCst);
            for _ in 0..20 {
                let lease = sup.acquire().await.expect("lease");
                assert!(lease.open.load(Ordering::SeqCst), "closed handle leased");
                assert!(lease.generation() >= last_generation);
                last_generation = lease.generation();
                tokio::time::sleep(Duration::from_millis(15)).await;
            }
            assert!(live.load(Ordering::SeqCst) <= 1);
        }
        assert_eq!(sup.generation(), 6);

        sup.shutdown().await;
        assert_eq!(live.load(Ordering::SeqCst), 0);
        assert_eq!(sup.status().phase, Phase::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_worker_flag_clears_on_shutdown() {
        let sup = Supervisor::builder(Scripted::default())
            .config(fast_config())
            .connect()
            .await
            .expect("connect");
        assert!(sup.is_supervising());

        sup.shutdown().await;
        assert!(!sup.is_supervising());
    }
}
