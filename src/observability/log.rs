use super::traits::{Observer, ObserverEvent, ObserverMetric};

/// Writes events to `tracing`. Never logs prompt or reply text.
pub struct LogObserver;

impl LogObserver {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LogObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl Observer for LogObserver {
    fn record_event(&self, event: &ObserverEvent) {
        match event {
            ObserverEvent::LlmRequest {
                provider,
                model,
                messages_count,
            } => {
                tracing::info!(provider = %provider, model = %model, messages_count, "llm.request");
            }
            ObserverEvent::LlmResponse {
                provider,
                model,
                duration,
                success,
                error_message,
            } => {
                let ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
                if *success {
                    tracing::info!(
                        provider = %provider,
                        model = %model,
                        duration_ms = ms,
                        "llm.response"
                    );
                } else {
                    tracing::warn!(
                        provider = %provider,
                        model = %model,
                        duration_ms = ms,
                        error = error_message.as_deref().unwrap_or("unknown"),
                        "llm.response failed"
                    );
                }
            }
            ObserverEvent::ChatCompleted { character_id } => {
                tracing::info!(character_id = %character_id, "chat.completed");
            }
            ObserverEvent::TestEvaluated { category, verdict } => {
                tracing::info!(category = %category, verdict = %verdict, "test.evaluated");
            }
            ObserverEvent::Error { component, message } => {
                tracing::error!(component = %component, error = %message, "error");
            }
        }
    }

    fn record_metric(&self, metric: &ObserverMetric) {
        match metric {
            ObserverMetric::RequestLatency(d) => {
                let ms = u64::try_from(d.as_millis()).unwrap_or(u64::MAX);
                tracing::debug!(latency_ms = ms, "metric.request_latency");
            }
            ObserverMetric::StoredRecords(n) => {
                tracing::debug!(records = n, "metric.stored_records");
            }
        }
    }

    fn name(&self) -> &str {
        "log"
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}
