use quill_domain::services::audit::{AuditEvent, LogSink, MemorySink};

/// Forwards engine events to `tracing`. A buffered sink also keeps every event so
/// the run can persist them as `logs.jsonl`.
#[derive(Debug, Default)]
pub struct TracingSink {
    buffer: Option<MemorySink>,
}

impl TracingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn buffered() -> Self {
        Self {
            buffer: Some(MemorySink::new()),
        }
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.buffer
            .as_ref()
            .map(MemorySink::events)
            .unwrap_or_default()
    }
}

impl LogSink for TracingSink {
    fn record(&self, event: AuditEvent) {
        let symbol = event.symbol.as_deref().unwrap_or("");
        match event.error.as_deref() {
            Some(error) => tracing::warn!(
                run_id = %event.run_id,
                stage = %event.stage,
                action = %event.action,
                timestamp = event.timestamp,
                symbol,
                error,
                details = %event.details,
                "engine event"
            ),
            None => tracing::debug!(
                run_id = %event.run_id,
                stage = %event.stage,
                action = %event.action,
                timestamp = event.timestamp,
                symbol,
                details = %event.details,
                "engine event"
            ),
        }
        if let Some(buffer) = &self.buffer {
            buffer.record(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::TracingSink;
    use quill_domain::services::audit::{AuditEvent, LogSink};

    #[test]
    fn buffered_sink_keeps_events_in_order() {
        let sink = TracingSink::buffered();
        sink.record(AuditEvent::new(1, "normalizer", "skip"));
        sink.record(AuditEvent::new(2, "engine", "cancelled").with_error("cancelled"));

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].action, "skip");
        assert_eq!(events[1].error.as_deref(), Some("cancelled"));
    }

    #[test]
    fn unbuffered_sink_drops_events() {
        let sink = TracingSink::new();
        sink.record(AuditEvent::new(1, "engine", "complete"));
        assert!(sink.events().is_empty());
    }
}
