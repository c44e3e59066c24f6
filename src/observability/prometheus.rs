use super::traits::{Observer, ObserverEvent, ObserverMetric};
use crate::evaluation::TestCategory;
use prometheus::{
    Encoder, Histogram, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

/// Prometheus-backed observer, scraped through `GET /metrics`.
pub struct PrometheusObserver {
    registry: Registry,
    llm_requests: IntCounterVec,
    llm_duration: HistogramVec,
    chats: IntCounterVec,
    tests: IntCounterVec,
    errors: IntCounterVec,
    request_latency: Histogram,
    stored_records: IntGauge,
}

impl PrometheusObserver {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let llm_requests = IntCounterVec::new(
            Opts::new("persona_llm_requests_total", "Upstream model calls by outcome"),
            &["provider", "model", "success"],
        )?;
        let llm_duration = HistogramVec::new(
            HistogramOpts::new(
                "persona_llm_request_duration_seconds",
                "Upstream model call duration",
            )
            .buckets(vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
            &["provider", "model"],
        )?;
        let chats = IntCounterVec::new(
            Opts::new("persona_chats_total", "Completed chat replies by character"),
            &["character_id"],
        )?;
        let tests = IntCounterVec::new(
            Opts::new("persona_tests_total", "Evaluated persona tests"),
            &["category", "verdict"],
        )?;
        let errors = IntCounterVec::new(
            Opts::new("persona_errors_total", "Errors by component"),
            &["component"],
        )?;
        let request_latency = Histogram::with_opts(HistogramOpts::new(
            "persona_request_latency_seconds",
            "Model call latency measured by the service",
        ))?;
        let stored_records = IntGauge::new("persona_stored_records", "Records in the store")?;

        registry.register(Box::new(llm_requests.clone()))?;
        registry.register(Box::new(llm_duration.clone()))?;
        registry.register(Box::new(chats.clone()))?;
        registry.register(Box::new(tests.clone()))?;
        registry.register(Box::new(errors.clone()))?;
        registry.register(Box::new(request_latency.clone()))?;
        registry.register(Box::new(stored_records.clone()))?;

        Ok(Self {
            registry,
            llm_requests,
            llm_duration,
            chats,
            tests,
            errors,
            request_latency,
            stored_records,
        })
    }

    /// Text exposition of every registered metric.
    pub fn encode(&self) -> String {
        let mut buf = Vec::new();
        let families = self.registry.gather();
        if let Err(e) = TextEncoder::new().encode(&families, &mut buf) {
            tracing::warn!("failed to encode prometheus metrics: {e}");
            return String::new();
        }
        String::from_utf8(buf).unwrap_or_default()
    }
}

impl Observer for PrometheusObserver {
    fn record_event(&self, event: &ObserverEvent) {
        match event {
            ObserverEvent::LlmRequest { .. } => {}
            ObserverEvent::LlmResponse {
                provider,
                model,
                duration,
                success,
                ..
            } => {
                let success = if *success { "true" } else { "false" };
                self.llm_requests
                    .with_label_values(&[provider.as_str(), model.as_str(), success])
                    .inc();
                self.llm_duration
                    .with_label_values(&[provider.as_str(), model.as_str()])
                    .observe(duration.as_secs_f64());
            }
            ObserverEvent::ChatCompleted { character_id } => {
                self.chats.with_label_values(&[character_id.as_str()]).inc();
            }
            ObserverEvent::TestEvaluated { category, verdict } => {
                let verdict = match verdict.as_str() {
                    "pass" | "fail" | "indeterminate" => verdict.as_str(),
                    _ => "other",
                };
                self.tests
                    .with_label_values(&[TestCategory::metric_label(category), verdict])
                    .inc();
            }
            ObserverEvent::Error { component, .. } => {
                self.errors.with_label_values(&[component.as_str()]).inc();
            }
        }
    }

    fn record_metric(&self, metric: &ObserverMetric) {
        match metric {
            ObserverMetric::RequestLatency(d) => self.request_latency.observe(d.as_secs_f64()),
            ObserverMetric::StoredRecords(n) => {
                self.stored_records.set(i64::try_from(*n).unwrap_or(i64::MAX));
            }
        }
    }

    fn name(&self) -> &str {
        "prometheus"
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}
