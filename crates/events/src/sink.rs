//! Event sink abstraction (mechanics only).
//!
//! ## Design
//!
//! The sink is intentionally **write-only** and makes minimal assumptions:
//!
//! - **Append-only**: events are facts; there is no read or delete surface here
//! - **Fire-and-forget**: `record` is infallible by signature; implementations
//!   swallow their own IO failures (log locally at most)
//! - **Transport-agnostic**: in-memory buffer, tracing, a database table, etc.
//!
//! ## Why infallible?
//!
//! The worker loop and every handler report through this interface. If
//! recording could fail, every call site would need a policy for a failure it
//! cannot meaningfully handle — and the one invariant that matters is that a
//! broken log must never abort a job. Pushing the guarantee into the signature
//! keeps call sites honest.

use std::sync::Arc;

use crate::event::OpsEvent;

/// Append-only operational log consumed by handlers and the worker loop.
pub trait EventSink: Send + Sync {
    /// Record one event. Must not panic and must not surface failures.
    fn record(&self, event: OpsEvent);
}

impl<S> EventSink for Arc<S>
where
    S: EventSink + ?Sized,
{
    fn record(&self, event: OpsEvent) {
        (**self).record(event)
    }
}
