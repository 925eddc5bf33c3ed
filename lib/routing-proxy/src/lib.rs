//! Routing-side decision making
//!
//! Discovery calls go through a circuit breaker; every answer feeds a
//! fallback cache that takes over while discovery is unavailable, and a
//! round-robin selector picks the instance.
pub mod discovery;
pub mod engine;
pub mod error;
pub mod fallback;
pub mod http;
pub mod load_balancer;
pub mod metrics;
pub mod policy;

pub use discovery::{DiscoveryClient, DiscoveryError, HttpDiscoveryClient};
pub use engine::{RouteDecision, RouteSource, RoutingEngine};
pub use error::RoutingError;
pub use fallback::{FallbackCache, FallbackConfig};
pub use http::GatewayApi;
pub use load_balancer::RoundRobinSelector;
pub use metrics::RoutingMetrics;
pub use policy::{BreakerError, CircuitBreaker, CircuitBreakerConfig, CircuitState};
