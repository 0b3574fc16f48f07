//! # Supervisor configuration.
//!
//! [`SupervisorConfig`] holds the timing knobs of one supervisor. It is copied into the
//! supervisor at construction and never changes afterwards. The target URI and
//! credentials belong to the [`Connector`](crate::Connector), not to this struct.
//!
//! ## Sentinel values
//! - `acquire_timeout = 0s` → `acquire()` fails fast with `Unavailable` while reconnecting
//! - `reconnect.max_attempts = None` → retry forever

use std::time::Duration;

use crate::policies::ReconnectPolicy;

const MIN_HEALTH_INTERVAL: Duration = Duration::from_millis(1);

/// Configuration of a connection supervisor.
///
/// ## Field semantics
/// - `connect_timeout`: bound on every connect attempt (initial and reconnect) and on closing a handle
/// - `health_interval`: probe period for polling backends (min 1ms)
/// - `probe_timeout`: bound on one probe round trip
/// - `acquire_timeout`: how long `acquire()` waits for a handle while reconnecting (`0s` = don't wait)
/// - `reconnect`: backoff and attempt bound for reconnect cycles
/// - `bus_capacity`: event bus ring buffer size (min 1)
#[derive(Clone, Debug)]
pub struct SupervisorConfig {
    /// Upper bound for establishing a connection.
    pub connect_timeout: Duration,

    /// Interval between health probes (polling strategy only).
    ///
    /// A dead handle is detected at most one interval after it dies.
    pub health_interval: Duration,

    /// Upper bound for one probe round trip.
    pub probe_timeout: Duration,

    /// Maximum time `acquire()` blocks while no handle is installed.
    ///
    /// Keep this short: callers blocked here are not doing anything useful.
    pub acquire_timeout: Duration,

    /// Reconnect backoff and bound.
    pub reconnect: ReconnectPolicy,

    /// Capacity of the event bus.
    pub bus_capacity: usize,
}

impl SupervisorConfig {
    /// Returns the acquire wait budget as an `Option` (`None` = fail fast).
    #[inline]
    pub fn acquire_wait(&self) -> Option<Duration> {
        if self.acquire_timeout == Duration::ZERO {
            None
        } else {
            Some(self.acquire_timeout)
        }
    }

    /// Returns the probe period clamped to a minimum of 1ms.
    #[inline]
    pub fn health_interval_clamped(&self) -> Duration {
        self.health_interval.max(MIN_HEALTH_INTERVAL)
    }

    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }

    /// Returns a copy with a bounded reconnect attempt count.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.reconnect = ReconnectPolicy::bounded(self.reconnect.backoff, attempts);
        self
    }
}

impl Default for SupervisorConfig {
    /// Default configuration:
    ///
    /// - `connect_timeout = 3s`
    /// - `health_interval = 5s`
    /// - `probe_timeout = 2s`
    /// - `acquire_timeout = 250ms`
    /// - `reconnect = ReconnectPolicy::default()` (unbounded, exponential with equal jitter)
    /// - `bus_capacity = 1024`
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(3),
            health_interval: Duration::from_secs(5),
            probe_timeout: Duration::from_secs(2),
            acquire_timeout: Duration::from_millis(250),
            reconnect: ReconnectPolicy::default(),
            bus_capacity: 1024,
        }
    }
}
