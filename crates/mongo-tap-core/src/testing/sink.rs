//! Event sink that records everything, for assertions in tests.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::sniff::event::{EventSink, JsonMap};

/// One captured `(op_code, summary, fields)` invocation.
#[derive(Debug, Clone)]
pub struct RecordedEvent {
    pub op_code: i32,
    pub summary: String,
    pub fields: JsonMap,
}

/// Sink that captures events behind a mutex.
///
/// Clones share the same underlying log, so a test can keep one clone and
/// hand another to the proxy.
#[derive(Debug, Default, Clone)]
pub struct RecordingSink {
    events: Arc<Mutex<Vec<RecordedEvent>>>,
}

impl EventSink for RecordingSink {
    fn record(&self, op_code: i32, summary: &str, fields: &JsonMap) {
        self.events
            .lock()
            .expect("recording sink lock")
            .push(RecordedEvent {
                op_code,
                summary: summary.to_string(),
                fields: fields.clone(),
            });
    }
}

impl RecordingSink {
    /// Snapshot of every recorded event, in arrival order.
    #[must_use]
    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().expect("recording sink lock").clone()
    }

    /// Recorded events with the given opcode.
    #[must_use]
    pub fn events_for(&self, op_code: i32) -> Vec<RecordedEvent> {
        self.events()
            .into_iter()
            .filter(|event| event.op_code == op_code)
            .collect()
    }

    /// Recorded decode-error events.
    #[must_use]
    pub fn error_events(&self) -> Vec<RecordedEvent> {
        self.events_for(0)
    }

    /// Poll until at least `count` events have arrived or the timeout
    /// elapses; returns whatever has been recorded.
    pub async fn wait_for(&self, count: usize, timeout: Duration) -> Vec<RecordedEvent> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let events = self.events();
            if events.len() >= count || tokio::time::Instant::now() >= deadline {
                return events;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}
