//! Wire types for the service-routing control plane
//!
//! This library defines the payloads exchanged between components:
//! - ServiceInstance: one healthy, routable application instance
//! - Registry payloads: health-listing entries and service registrations
//! - Routing payloads: the gateway's `POST /route` contract
//! - Discovery payloads: the healthy-instance listing and cache status

pub mod v1;

pub use v1::{
    AgentService, CacheStatus, ErrorResponse, HealthCheck, HealthEntry,
    HealthyServicesResponse, RouteRequest, RouteResponse, ServiceFilters, ServiceInstance,
    ServiceRegistration,
};
