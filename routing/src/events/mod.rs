//! Typed events and a per-request event log
//!
//! Producers are the stream parser (Thinking, ToolCall, ToolResult, Plan,
//! FinalAnswer reclassified from raw tokens) and the pipeline stages
//! (Complexity, Architecture, Plan, Error, ErrorAnalysis, Escalation,
//! Cancelled, Failure).

pub mod types;

pub use types::{EventKind, StreamEvent};

/// Ordered events of one request
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Vec<StreamEvent>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: StreamEvent) {
        self.events.push(event);
    }

    pub fn events(&self) -> &[StreamEvent] {
        &self.events
    }

    pub fn of_kind(&self, kind: EventKind) -> impl Iterator<Item = &StreamEvent> {
        self.events.iter().filter(move |e| e.kind == kind)
    }

    pub fn count(&self, kind: EventKind) -> usize {
        self.of_kind(kind).count()
    }

    pub fn kinds(&self) -> Vec<EventKind> {
        self.events.iter().map(|e| e.kind).collect()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn into_events(self) -> Vec<StreamEvent> {
        self.events
    }
}

impl Extend<StreamEvent> for EventLog {
    fn extend<T: IntoIterator<Item = StreamEvent>>(&mut self, iter: T) {
        self.events.extend(iter);
    }
}
