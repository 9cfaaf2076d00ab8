use serde::Serialize;
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditEvent {
    pub run_id: String,
    pub timestamp: i64,
    pub stage: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub details: serde_json::Value,
}

impl AuditEvent {
    pub fn new(timestamp: i64, stage: &str, action: &str) -> Self {
        Self {
            run_id: String::new(),
            timestamp,
            stage: stage.to_string(),
            symbol: None,
            action: action.to_string(),
            error: None,
            details: serde_json::Value::Null,
        }
    }

    pub fn with_symbol(mut self, symbol: &str) -> Self {
        self.symbol = Some(symbol.to_string());
        self
    }

    pub fn with_error(mut self, error: &str) -> Self {
        self.error = Some(error.to_string());
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }
}

/// Destination for structured engine events. Components receive it through
/// [`RunContext`] instead of writing to a global stream.
pub trait LogSink: Send + Sync {
    fn record(&self, event: AuditEvent);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl LogSink for NullSink {
    fn record(&self, _event: AuditEvent) {}
}

#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.lock().clone()
    }

    pub fn drain(&self) -> Vec<AuditEvent> {
        std::mem::take(&mut *self.lock())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn count(&self, stage: &str, action: &str) -> usize {
        self.lock()
            .iter()
            .filter(|event| event.stage == stage && event.action == action)
            .count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<AuditEvent>> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl LogSink for MemorySink {
    fn record(&self, event: AuditEvent) {
        self.lock().push(event);
    }
}

pub type CancelHook<'a> = &'a (dyn Fn() -> bool + Sync);

/// Per-run capabilities handed to every pipeline stage.
#[derive(Clone, Copy)]
pub struct RunContext<'a> {
    pub run_id: &'a str,
    pub sink: &'a dyn LogSink,
    pub should_cancel: Option<CancelHook<'a>>,
}

impl<'a> RunContext<'a> {
    pub fn new(run_id: &'a str, sink: &'a dyn LogSink) -> Self {
        Self {
            run_id,
            sink,
            should_cancel: None,
        }
    }

    pub fn with_cancel(mut self, should_cancel: CancelHook<'a>) -> Self {
        self.should_cancel = Some(should_cancel);
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.should_cancel.map(|hook| hook()).unwrap_or(false)
    }

    pub fn emit(&self, mut event: AuditEvent) {
        event.run_id = self.run_id.to_string();
        self.sink.record(event);
    }
}
