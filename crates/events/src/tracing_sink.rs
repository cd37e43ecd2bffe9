//! Event sink backed by `tracing`.

use tracing::{error, info, warn};

use crate::event::{EventLevel, OpsEvent};
use crate::sink::EventSink;

/// Emits each event as a structured `tracing` record.
///
/// Suitable as the default production sink: durable sinks (a database table,
/// a log shipper) implement [`EventSink`] themselves and can be layered via
/// a fan-out wrapper if both are wanted.
#[derive(Debug, Default)]
pub struct TracingEventSink;

impl TracingEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for TracingEventSink {
    fn record(&self, event: OpsEvent) {
        let job_id = event.job_id.map(|id| id.to_string());
        let data = event.data.as_ref().map(|d| d.to_string());
        match event.level {
            EventLevel::Info => info!(
                event = %event.name,
                job_id = job_id.as_deref(),
                message = event.message.as_deref(),
                data = data.as_deref(),
            ),
            EventLevel::Warn => warn!(
                event = %event.name,
                job_id = job_id.as_deref(),
                message = event.message.as_deref(),
                data = data.as_deref(),
            ),
            EventLevel::Error => error!(
                event = %event.name,
                job_id = job_id.as_deref(),
                message = event.message.as_deref(),
                data = data.as_deref(),
            ),
        }
    }
}
