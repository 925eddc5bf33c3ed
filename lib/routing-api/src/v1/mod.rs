/// API version v1 for routing control plane payloads

pub mod instance;
pub mod registry;
pub mod routing;
pub mod discovery;

pub use instance::ServiceInstance;
pub use registry::{AgentService, HealthCheck, HealthEntry, Node, ServiceRegistration};
pub use routing::{ErrorResponse, RouteRequest, RouteResponse};
pub use discovery::{CacheStatus, HealthyServicesResponse, ServiceFilters};

/// Health status reported by a registry check that counts as healthy
pub const STATUS_PASSING: &str = "passing";
/// Response header carrying the registry's blocking-query index
pub const INDEX_HEADER: &str = "X-Consul-Index";
/// Request header carrying the registry ACL token
pub const TOKEN_HEADER: &str = "X-Consul-Token";
/// `detail` of the discovery service's 503 while its cache is still cold
pub const NOT_WARM_DETAIL: &str = "Service cache not yet warm, retry shortly";
