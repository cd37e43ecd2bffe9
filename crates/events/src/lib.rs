//! `drip-events` — the operational event sink.
//!
//! Handlers and the worker loop report what happened (`job.claimed`,
//! `email.sent`, `worker.heartbeat`, ...) through a single append-only,
//! write-only interface. Recording is **fire-and-forget**: a sink that cannot
//! persist an event must swallow the failure, never surface it — observability
//! problems must not abort a handler or the loop.

pub mod event;
pub mod in_memory_sink;
pub mod sink;
pub mod tracing_sink;

pub use event::{EventLevel, OpsEvent};
pub use in_memory_sink::InMemoryEventSink;
pub use sink::EventSink;
pub use tracing_sink::TracingEventSink;
