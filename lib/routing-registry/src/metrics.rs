//! Prometheus metrics for the registry watcher and the discovery service

use anyhow::Result;
use prometheus::{Encoder, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use std::sync::Arc;

/// Metrics describing watch progress and cache contents
#[derive(Clone)]
pub struct WatcherMetrics {
    /// Registry polls by result (`changed`, `not_found`, `error`)
    pub polls_total: IntCounterVec,
    /// Index of the last applied watch cycle
    pub watch_index: IntGauge,
    /// Instances currently held by the service cache
    pub cache_instances: IntGauge,
    pub registry: Arc<Registry>,
}

impl WatcherMetrics {
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());

        let polls_total = IntCounterVec::new(
            Opts::new("registry_polls_total", "Registry watch polls by result"),
            &["result"],
        )?;
        let watch_index = IntGauge::new("registry_watch_index", "Index of the last applied watch cycle")?;
        let cache_instances = IntGauge::new("service_cache_instances", "Instances held by the service cache")?;

        registry.register(Box::new(polls_total.clone()))?;
        registry.register(Box::new(watch_index.clone()))?;
        registry.register(Box::new(cache_instances.clone()))?;

        Ok(Self {
            polls_total,
            watch_index,
            cache_instances,
            registry,
        })
    }

    pub(crate) fn record_update(&self, result: &str, index: u64, instances: usize) {
        self.polls_total.with_label_values(&[result]).inc();
        self.watch_index.set(i64::try_from(index).unwrap_or(i64::MAX));
        self.cache_instances.set(i64::try_from(instances).unwrap_or(i64::MAX));
    }

    pub(crate) fn record_error(&self) {
        self.polls_total.with_label_values(&["error"]).inc();
    }

    /// Gather all metrics in Prometheus text format
    pub fn gather(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = vec![];
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_update_and_error() {
        let metrics = WatcherMetrics::new().unwrap();
        metrics.record_update("changed", 12, 3);
        metrics.record_error();

        assert_eq!(metrics.watch_index.get(), 12);
        assert_eq!(metrics.cache_instances.get(), 3);
        assert_eq!(metrics.polls_total.with_label_values(&["changed"]).get(), 1);
        assert_eq!(metrics.polls_total.with_label_values(&["error"]).get(), 1);

        let text = metrics.gather().unwrap();
        assert!(text.contains("registry_polls_total"));
        assert!(text.contains("# TYPE registry_watch_index gauge"));
    }
}
