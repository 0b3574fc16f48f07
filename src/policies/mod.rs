//! Reconnect policies.
//!
//! ## Contents
//! - [`ReconnectPolicy`] whether to keep retrying and how many times
//! - [`BackoffPolicy`] how the delay between attempts evolves (first / factor / max)
//! - [`JitterPolicy`] randomization so supervisors of one backend do not retry in lockstep
//!
//! ## Defaults
//! - `ReconnectPolicy::default()` → retry forever.
//! - `BackoffPolicy::default()` → first=500ms, factor=2.0, max=30s, jitter=Equal.

mod backoff;
mod jitter;
mod reconnect;

pub use backoff::BackoffPolicy;
pub use jitter::JitterPolicy;
pub use reconnect::ReconnectPolicy;
