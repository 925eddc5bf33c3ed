//! HTTP API of the discovery service over the service cache

use crate::metrics::WatcherMetrics;
use hyper::body::Incoming;
use hyper::{Method, Request, StatusCode};
use routing_api::v1::NOT_WARM_DETAIL;
use routing_api::{ErrorResponse, HealthyServicesResponse, ServiceFilters};
use routing_core::server::{
    json_response, method_not_allowed_response, not_found_response, parse_query, text_response, HttpResponse,
};
use routing_core::ServiceCache;
use std::sync::Arc;
use tracing::{debug, warn};

/// DiscoveryApi serves the healthy-instance listing, cache introspection and
/// health endpoints
pub struct DiscoveryApi {
    cache: Arc<ServiceCache>,
    metrics: Option<WatcherMetrics>,
}

impl DiscoveryApi {
    pub fn new(cache: Arc<ServiceCache>, metrics: Option<WatcherMetrics>) -> Self {
        Self { cache, metrics }
    }

    /// hyper entry point
    pub async fn handle(self: Arc<Self>, req: Request<Incoming>) -> Result<HttpResponse, hyper::Error> {
        Ok(self.respond(req.method(), req.uri().path(), req.uri().query()))
    }

    /// Route a request by method, path and query string
    pub fn respond(&self, method: &Method, path: &str, query: Option<&str>) -> HttpResponse {
        let known = matches!(
            path,
            "/services/healthy" | "/services/cache/status" | "/healthz" | "/readyz" | "/metrics"
        );
        if !known {
            return not_found_response();
        }
        if method != Method::GET {
            return method_not_allowed_response();
        }

        match path {
            "/services/healthy" => self.healthy_services(query),
            "/services/cache/status" => json_response(StatusCode::OK, &self.cache.status()),
            "/healthz" => text_response(StatusCode::OK, "OK\n"),
            "/readyz" => {
                if self.cache.is_warm() {
                    text_response(StatusCode::OK, "OK\n")
                } else {
                    text_response(StatusCode::SERVICE_UNAVAILABLE, "cache not warm\n")
                }
            }
            _ => self.metrics_text(),
        }
    }

    fn healthy_services(&self, query: Option<&str>) -> HttpResponse {
        let params = parse_query(query);

        let image_id = match params.get("image_id").map(|v| v.trim()).filter(|v| !v.is_empty()) {
            None => None,
            Some(raw) => match raw.parse::<i64>() {
                Ok(image_id) => Some(image_id),
                Err(_) => {
                    return json_response(
                        StatusCode::BAD_REQUEST,
                        &ErrorResponse::new(format!("image_id must be an integer, got {:?}", raw)),
                    )
                }
            },
        };
        let app_hostname = params
            .get("app_hostname")
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .map(str::to_string);

        if !self.cache.is_warm() {
            debug!("Healthy listing requested before the cache is warm");
            return json_response(StatusCode::SERVICE_UNAVAILABLE, &ErrorResponse::new(NOT_WARM_DETAIL));
        }

        let services = self.cache.get(image_id, app_hostname.as_deref());
        debug!(?image_id, app_hostname = ?app_hostname, count = services.len(), "Served healthy listing");
        json_response(
            StatusCode::OK,
            &HealthyServicesResponse {
                count: services.len(),
                services,
                filters: ServiceFilters { image_id, app_hostname },
            },
        )
    }

    fn metrics_text(&self) -> HttpResponse {
        let Some(metrics) = &self.metrics else {
            return not_found_response();
        };
        match metrics.gather() {
            Ok(text) => text_response(StatusCode::OK, text),
            Err(e) => {
                warn!("Failed to gather metrics: {}", e);
                text_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error\n")
            }
        }
    }
}
