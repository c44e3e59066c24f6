use std::time::Duration;

/// Events the observer can record
#[derive(Debug, Clone)]
pub enum ObserverEvent {
    /// A request is about to be sent to the model gateway.
    ///
    /// Emitted immediately before the upstream call. Carries counts only, so
    /// observers never see prompt contents.
    LlmRequest {
        provider: String,
        model: String,
        messages_count: usize,
    },
    /// Result of a single upstream call.
    LlmResponse {
        provider: String,
        model: String,
        duration: Duration,
        success: bool,
        error_message: Option<String>,
    },
    /// A chat request produced a reply.
    ChatCompleted {
        character_id: String,
    },
    /// A persona test was evaluated and stored.
    TestEvaluated {
        category: String,
        verdict: String,
    },
    Error {
        component: String,
        message: String,
    },
}

/// Numeric metrics
#[derive(Debug, Clone)]
pub enum ObserverMetric {
    /// Wall time of one upstream model call, measured by the service.
    RequestLatency(Duration),
    StoredRecords(u64),
}

/// Core observability trait. Implement for any backend.
pub trait Observer: Send + Sync + 'static {
    /// Record a discrete event
    fn record_event(&self, event: &ObserverEvent);

    /// Record a numeric metric
    fn record_metric(&self, metric: &ObserverMetric);

    /// Flush any buffered data (no-op for most backends)
    fn flush(&self) {}

    /// Human-readable name of this observer
    fn name(&self) -> &str;

    /// Downcast to `Any` for backend-specific operations
    fn as_any(&self) -> &dyn std::any::Any;
}
