//! Prometheus metrics for routing decisions

use crate::policy::CircuitState;
use anyhow::Result;
use prometheus::{Encoder, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use std::sync::Arc;

/// Prometheus metrics collector for the routing gateway
#[derive(Clone)]
pub struct RoutingMetrics {
    /// Routing requests by outcome (`discovery`, `fallback`, `invalid`,
    /// `unavailable`, `not_warm`)
    pub route_requests_total: IntCounterVec,
    /// Discovery calls by result (`ok`, `error`, `not_warm`, `rejected`)
    pub discovery_calls_total: IntCounterVec,
    /// Breaker state: 0 closed, 1 open, 2 half-open
    pub circuit_breaker_state: IntGauge,
    /// Entries held by the fallback cache
    pub fallback_cache_entries: IntGauge,
    /// Prometheus registry for metrics
    pub registry: Arc<Registry>,
}

impl RoutingMetrics {
    /// Create a new metrics collector
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());

        let route_requests_total = IntCounterVec::new(
            Opts::new("route_requests_total", "Routing requests by outcome"),
            &["outcome"],
        )?;

        let discovery_calls_total = IntCounterVec::new(
            Opts::new("discovery_calls_total", "Discovery calls by result"),
            &["result"],
        )?;

        let circuit_breaker_state = IntGauge::new(
            "circuit_breaker_state",
            "Discovery circuit breaker state (0 closed, 1 open, 2 half-open)",
        )?;

        let fallback_cache_entries = IntGauge::new("fallback_cache_entries", "Entries in the fallback cache")?;

        registry.register(Box::new(route_requests_total.clone()))?;
        registry.register(Box::new(discovery_calls_total.clone()))?;
        registry.register(Box::new(circuit_breaker_state.clone()))?;
        registry.register(Box::new(fallback_cache_entries.clone()))?;

        Ok(Self {
            route_requests_total,
            discovery_calls_total,
            circuit_breaker_state,
            fallback_cache_entries,
            registry,
        })
    }

    pub fn record_route(&self, outcome: &str) {
        self.route_requests_total.with_label_values(&[outcome]).inc();
    }

    pub fn record_discovery(&self, result: &str) {
        self.discovery_calls_total.with_label_values(&[result]).inc();
    }

    pub fn set_state(&self, state: CircuitState, fallback_entries: usize) {
        self.circuit_breaker_state.set(state.as_gauge());
        self.fallback_cache_entries
            .set(i64::try_from(fallback_entries).unwrap_or(i64::MAX));
    }

    /// Gather all metrics in Prometheus text format
    pub fn gather(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = vec![];
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}
