//! Routing decision engine
//!
//! Asks discovery for the healthy instances of a hostname through the
//! circuit breaker, keeps the fallback cache fed with every non-empty answer,
//! and falls back to it whenever discovery cannot answer.

use crate::discovery::{DiscoveryClient, DiscoveryError};
use crate::error::RoutingError;
use crate::fallback::FallbackCache;
use crate::load_balancer::RoundRobinSelector;
use crate::metrics::RoutingMetrics;
use crate::policy::{BreakerError, CircuitBreaker};
use routing_api::{RouteResponse, ServiceInstance};
use routing_core::normalize_hostname;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Where the instances behind a decision came from
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RouteSource {
    Discovery,
    Fallback,
}

impl RouteSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteSource::Discovery => "discovery",
            RouteSource::Fallback => "fallback",
        }
    }
}

/// A routing decision
#[derive(Clone, Debug, PartialEq)]
pub struct RouteDecision {
    pub hostname: String,
    pub image_id: i64,
    pub instance: ServiceInstance,
    pub source: RouteSource,
    /// How long the caller may reuse the decision
    pub ttl: Duration,
}

impl RouteDecision {
    pub fn response(&self) -> RouteResponse {
        RouteResponse {
            target_host: self.instance.address.clone(),
            target_port: self.instance.target_port(),
            container_id: self.instance.instance_id.clone(),
            image_id: self.image_id,
            ttl: self.ttl.as_secs(),
        }
    }
}

/// RoutingEngine owns no state of its own; the breaker, fallback cache and
/// selector are process-wide and shared with whoever else needs them.
pub struct RoutingEngine {
    discovery: Arc<dyn DiscoveryClient>,
    breaker: Arc<CircuitBreaker>,
    fallback: Arc<FallbackCache>,
    selector: Arc<RoundRobinSelector>,
    route_ttl: Duration,
    metrics: Option<RoutingMetrics>,
    // Set while the latest discovery failure was a cold cache, so an open
    // breaker keeps reporting "not warm" instead of plain unavailability
    discovery_cold: AtomicBool,
}

impl RoutingEngine {
    pub fn new(
        discovery: Arc<dyn DiscoveryClient>,
        breaker: Arc<CircuitBreaker>,
        fallback: Arc<FallbackCache>,
        selector: Arc<RoundRobinSelector>,
        route_ttl: Duration,
    ) -> Self {
        Self {
            discovery,
            breaker,
            fallback,
            selector,
            route_ttl,
            metrics: None,
            discovery_cold: AtomicBool::new(false),
        }
    }

    pub fn with_metrics(mut self, metrics: RoutingMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn metrics(&self) -> Option<&RoutingMetrics> {
        self.metrics.as_ref()
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn fallback(&self) -> &FallbackCache {
        &self.fallback
    }

    /// Decide where a request for `hostname` goes
    pub async fn route(&self, hostname: Option<&str>) -> Result<RouteDecision, RoutingError> {
        let result = self.decide(hostname).await;

        if let Some(metrics) = &self.metrics {
            let outcome = match &result {
                Ok(decision) => decision.source.as_str(),
                Err(e) => e.outcome(),
            };
            metrics.record_route(outcome);
            metrics.set_state(self.breaker.state(), self.fallback.len());
        }
        result
    }

    async fn decide(&self, raw: Option<&str>) -> Result<RouteDecision, RoutingError> {
        let hostname = raw
            .and_then(normalize_hostname)
            .ok_or_else(|| RoutingError::Validation("app_hostname is required".to_string()))?;

        let discovered = self
            .breaker
            .call(|| self.discovery.healthy_instances(&hostname))
            .await;
        self.record_discovery(&discovered);
        match &discovered {
            Ok(_) | Err(BreakerError::Operation(_)) => {
                let cold = matches!(discovered, Err(BreakerError::Operation(DiscoveryError::NotWarm)));
                self.discovery_cold.store(cold, Ordering::Relaxed);
            }
            Err(BreakerError::Open { .. }) => {}
        }

        match discovered {
            Ok(instances) if instances.is_empty() => {
                debug!(hostname = %hostname, "Discovery returned no instances");
                Err(RoutingError::NoHealthyInstances { hostname })
            }
            Ok(instances) => {
                self.fallback.update(&hostname, instances.clone());
                self.select(hostname, &instances, RouteSource::Discovery)
            }
            Err(err) => {
                let not_warm = match &err {
                    BreakerError::Operation(DiscoveryError::NotWarm) => true,
                    BreakerError::Open { .. } => self.discovery_cold.load(Ordering::Relaxed),
                    BreakerError::Operation(_) => false,
                };
                match self.fallback.get(&hostname) {
                    Some(instances) => {
                        debug!(hostname = %hostname, error = %err, "Routing from fallback cache");
                        self.select(hostname, &instances, RouteSource::Fallback)
                    }
                    None if not_warm => Err(RoutingError::CacheNotWarm),
                    None => {
                        warn!(hostname = %hostname, error = %err, "Discovery unavailable and no fallback entry");
                        Err(RoutingError::NoHealthyInstances { hostname })
                    }
                }
            }
        }
    }

    fn select(
        &self,
        hostname: String,
        instances: &[ServiceInstance],
        source: RouteSource,
    ) -> Result<RouteDecision, RoutingError> {
        let Some(image_id) = instances.iter().find_map(|i| i.image_id) else {
            warn!(hostname = %hostname, "Instances carry no image id");
            return Err(RoutingError::NoHealthyInstances { hostname });
        };
        let Some(instance) = self.selector.select(image_id, instances) else {
            return Err(RoutingError::NoHealthyInstances { hostname });
        };

        debug!(
            hostname = %hostname,
            image_id,
            instance_id = %instance.instance_id,
            source = source.as_str(),
            "Route selected"
        );
        Ok(RouteDecision {
            instance: instance.clone(),
            hostname,
            image_id,
            source,
            ttl: self.route_ttl,
        })
    }

    fn record_discovery<T>(&self, result: &Result<T, BreakerError<DiscoveryError>>) {
        let Some(metrics) = &self.metrics else {
            return;
        };
        let label = match result {
            Ok(_) => "ok",
            Err(BreakerError::Open { .. }) => "rejected",
            Err(BreakerError::Operation(DiscoveryError::NotWarm)) => "not_warm",
            Err(BreakerError::Operation(_)) => "error",
        };
        metrics.record_discovery(label);
    }
}
