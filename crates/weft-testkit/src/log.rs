//! Shared event log for asserting execution order

use std::sync::Arc;

use parking_lot::Mutex;

/// Append-only list of labeled events, shared between middlewares, method
/// implementations, and the test body.
#[derive(Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<String>>>,
}

impl EventLog {
    /// Empty log
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one event
    pub fn record(&self, event: impl Into<String>) {
        self.events.lock().push(event.into());
    }

    /// Snapshot of all events, in order
    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    /// Drop all recorded events
    pub fn clear(&self) {
        self.events.lock().clear();
    }
}
