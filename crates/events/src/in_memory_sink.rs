//! In-memory event sink for tests/dev.

use std::sync::Mutex;

use crate::event::OpsEvent;
use crate::sink::EventSink;

/// Buffers events in memory.
///
/// - No IO
/// - Unbounded; intended for tests and short-lived dev runs
#[derive(Debug, Default)]
pub struct InMemoryEventSink {
    events: Mutex<Vec<OpsEvent>>,
}

impl InMemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far.
    pub fn events(&self) -> Vec<OpsEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Names of recorded events, in order. Convenient for assertions.
    pub fn names(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .map(|e| e.name)
            .collect()
    }

    /// Drop everything recorded so far.
    pub fn clear(&self) {
        if let Ok(mut events) = self.events.lock() {
            events.clear();
        }
    }
}

impl EventSink for InMemoryEventSink {
    fn record(&self, event: OpsEvent) {
        // A poisoned lock means a test already panicked; losing the event is fine.
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}
