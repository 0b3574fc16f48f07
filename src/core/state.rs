//! # Supervisor state.
//!
//! ```text
//!              probe fails / peer closes
//!   Healthy ─────────────────────────────► Detecting ──► Reconnecting ──┐
//!      ▲                                                     │  ▲       │ attempts exhausted
//!      └──────────────── swap(new handle) ◄──────────────────┘  │       ▼
//!                                                               └──── Degraded ◄── (rearm)
//!   any phase ── shutdown() ──► Closed
//! ```
//!
//! ## Rules
//! - `current` is `Some` iff phase is `Healthy`.
//! - `generation` only grows; it is bumped by every install.
//! - The slot lock guards the reference only; nobody holds it across a network call.

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;
use std::time::Instant;

use crate::transport::{BackendKind, Transport};

/// Lifecycle phase of a supervised connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// A live handle is installed.
    Healthy,
    /// Failure observed; the dead handle is being withdrawn.
    Detecting,
    /// Reconnect attempts in progress.
    Reconnecting,
    /// Bounded attempts exhausted; waiting for `rearm()`.
    Degraded {
        /// Attempts made in the exhausted cycle.
        attempts: u32,
    },
    /// Shut down.
    Closed,
}

impl Phase {
    /// Stable lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Healthy => "healthy",
            Phase::Detecting => "detecting",
            Phase::Reconnecting => "reconnecting",
            Phase::Degraded { .. } => "degraded",
            Phase::Closed => "closed",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observable snapshot of a supervisor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Status {
    /// Current phase.
    pub phase: Phase,
    /// Generation of the last installed handle.
    pub generation: u64,
}

impl Status {
    /// True if a handle is installed.
    pub fn is_healthy(&self) -> bool {
        self.phase == Phase::Healthy
    }
}

/// The lock-protected part of the supervisor state.
pub(crate) struct Slot<H> {
    pub(crate) current: Option<Arc<Transport<H>>>,
    pub(crate) generation: u64,
    pub(crate) phase: Phase,
}

impl<H> Slot<H> {
    pub(crate) fn new(first: Transport<H>) -> Self {
        Self {
            generation: first.generation(),
            current: Some(Arc::new(first)),
            phase: Phase::Healthy,
        }
    }

    pub(crate) fn status(&self) -> Status {
        Status {
            phase: self.phase,
            generation: self.generation,
        }
    }

    /// Removes the handle of `generation` if it is still the installed one.
    pub(crate) fn withdraw(&mut self, generation: u64) -> Option<Arc<Transport<H>>> {
        if self.generation != generation || self.current.is_none() {
            return None;
        }
        self.phase = Phase::Detecting;
        self.current.take()
    }

    /// Installs a fresh handle as the next generation; returns the replaced one.
    pub(crate) fn install(&mut self, handle: H, kind: BackendKind) -> Option<Arc<Transport<H>>> {
        self.generation += 1;
        self.phase = Phase::Healthy;
        self.current
            .replace(Arc::new(Transport::new(handle, kind, self.generation)))
    }
}

/// A handle borrowed for one operation.
///
/// Holding a lease keeps the handle object alive but does not stop the supervisor from
/// replacing and closing it: operations on a superseded lease fail with the backend's
/// "connection closed" error instead of hanging.
pub struct Lease<H> {
    transport: Arc<Transport<H>>,
}

impl<H> Lease<H> {
    pub(crate) fn new(transport: Arc<Transport<H>>) -> Self {
        Self { transport }
    }

    /// Generation the handle belongs to.
    pub fn generation(&self) -> u64 {
        self.transport.generation()
    }

    /// Backend kind.
    pub fn kind(&self) -> BackendKind {
        self.transport.kind()
    }

    /// When the handle was established.
    pub fn created_at(&self) -> Instant {
        self.transport.created_at()
    }
}

impl<H> Clone for Lease<H> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
        }
    }
}

impl<H> Deref for Lease<H> {
    type Target = H;

    fn deref(&self) -> &H {
        self.transport.get()
    }
}

impl<H> fmt::Debug for Lease<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Lease").field(&self.transport).finish()
    }
}
