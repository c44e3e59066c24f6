pub mod log;
pub mod prometheus;
pub mod traits;

pub use self::log::LogObserver;
pub use self::prometheus::PrometheusObserver;
pub use traits::{Observer, ObserverEvent, ObserverMetric};

use std::sync::Arc;

/// Swallows everything. Default for tests and library embedding.
pub struct NoopObserver;

impl Observer for NoopObserver {
    fn record_event(&self, _event: &ObserverEvent) {}

    fn record_metric(&self, _metric: &ObserverMetric) {}

    fn name(&self) -> &str {
        "noop"
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

/// Fans every call out to several observers.
pub struct MultiObserver {
    observers: Vec<Arc<dyn Observer>>,
}

impl MultiObserver {
    pub fn new(observers: Vec<Arc<dyn Observer>>) -> Self {
        Self { observers }
    }

    /// First member with the given concrete type.
    pub fn find<T: Observer>(&self) -> Option<&T> {
        self.observers
            .iter()
            .find_map(|o| o.as_any().downcast_ref::<T>())
    }
}

impl Observer for MultiObserver {
    fn record_event(&self, event: &ObserverEvent) {
        for observer in &self.observers {
            observer.record_event(event);
        }
    }

    fn record_metric(&self, metric: &ObserverMetric) {
        for observer in &self.observers {
            observer.record_metric(metric);
        }
    }

    fn flush(&self) {
        for observer in &self.observers {
            observer.flush();
        }
    }

    fn name(&self) -> &str {
        "multi"
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

/// Prometheus exposition text if `observer` is, or contains, a
/// `PrometheusObserver`.
pub fn prometheus_text(observer: &dyn Observer) -> Option<String> {
    let any = observer.as_any();
    if let Some(prom) = any.downcast_ref::<PrometheusObserver>() {
        return Some(prom.encode());
    }
    any.downcast_ref::<MultiObserver>()
        .and_then(|multi| multi.find::<PrometheusObserver>())
        .map(PrometheusObserver::encode)
}
