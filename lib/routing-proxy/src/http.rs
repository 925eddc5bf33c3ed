//! HTTP front of the routing gateway

use crate::engine::RoutingEngine;
use hyper::body::Incoming;
use hyper::header::HeaderValue;
use hyper::{Method, Request, StatusCode};
use routing_api::{ErrorResponse, RouteRequest};
use routing_core::normalize_hostname;
use routing_core::server::{
    collect_body, json_response, method_not_allowed_response, not_found_response, text_response, HttpResponse,
};
use std::sync::Arc;
use tracing::{debug, warn};

/// Response header naming where the routed instance came from
pub const ROUTE_SOURCE_HEADER: &str = "X-Route-Source";

/// GatewayApi serves `POST /route` plus operational endpoints
pub struct GatewayApi {
    engine: Arc<RoutingEngine>,
}

impl GatewayApi {
    pub fn new(engine: Arc<RoutingEngine>) -> Self {
        Self { engine }
    }

    /// hyper entry point
    pub async fn handle(self: Arc<Self>, req: Request<Incoming>) -> Result<HttpResponse, hyper::Error> {
        let (parts, body) = req.into_parts();
        match (parts.method, parts.uri.path()) {
            (Method::POST, "/route") => {
                let body = collect_body(body).await?;
                Ok(self.route(&body).await)
            }
            (method, path) => Ok(self.respond(&method, path)),
        }
    }

    /// Answer a routing request body
    pub async fn route(&self, body: &[u8]) -> HttpResponse {
        let request: RouteRequest = match serde_json::from_slice(body) {
            Ok(request) => request,
            Err(e) => {
                debug!("Rejected routing request body: {}", e);
                if let Some(metrics) = self.engine.metrics() {
                    metrics.record_route("invalid");
                }
                return json_response(
                    StatusCode::BAD_REQUEST,
                    &ErrorResponse::new(format!("Invalid request body: {}", e)),
                );
            }
        };

        let hostname = request.hostname(|h| normalize_hostname(h).is_some());
        match self.engine.route(hostname).await {
            Ok(decision) => {
                let mut response = json_response(StatusCode::OK, &decision.response());
                response
                    .headers_mut()
                    .insert(ROUTE_SOURCE_HEADER, HeaderValue::from_static(decision.source.as_str()));
                response
            }
            Err(e) => json_response(e.status_code(), &ErrorResponse::new(e.to_string())),
        }
    }

    /// Non-routing endpoints
    pub fn respond(&self, method: &Method, path: &str) -> HttpResponse {
        let known = matches!(path, "/route" | "/healthz" | "/metrics" | "/fallback/status");
        if !known {
            return not_found_response();
        }
        if path == "/route" || method != Method::GET {
            return method_not_allowed_response();
        }

        match path {
            "/healthz" => text_response(StatusCode::OK, "OK\n"),
            "/fallback/status" => json_response(StatusCode::OK, &self.engine.fallback().status()),
            _ => self.metrics_text(),
        }
    }

    fn metrics_text(&self) -> HttpResponse {
        let Some(metrics) = self.engine.metrics() else {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::{DiscoveryClient, DiscoveryError};
    use crate::fallback::{FallbackCache, FallbackConfig};
    use crate::load_balancer::RoundRobinSelector;
    use crate::metrics::RoutingMetrics;
    use crate::policy::{CircuitBreaker, CircuitBreakerConfig};
    use async_trait::async_trait;
    use http_body_util::BodyExt;
    use routing_api::{RouteResponse, ServiceInstance};
    use std::time::Duration;

    struct StaticDiscovery(Result<Vec<ServiceInstance>, ()>);

    #[async_trait]
    impl DiscoveryClient for StaticDiscovery {
        async fn healthy_instances(&self, _hostname: &str) -> Result<Vec<ServiceInstance>, DiscoveryError> {
            self.0
                .clone()
                .map_err(|_| DiscoveryError::UnexpectedStatus { status: 502 })
        }
    }

    fn api(discovery: StaticDiscovery) -> GatewayApi {
        let engine = RoutingEngine::new(
            Arc::new(discovery),
            Arc::new(CircuitBreaker::new(CircuitBreakerConfig::default())),
            Arc::new(FallbackCache::new(FallbackConfig::default())),
            Arc::new(RoundRobinSelector::new()),
            Duration::from_secs(30),
        )
        .with_metrics(RoutingMetrics::new().unwrap());
        GatewayApi::new(Arc::new(engine))
    }

    fn healthy() -> StaticDiscovery {
        StaticDiscovery(Ok(vec![ServiceInstance {
            instance_id: "c-1".to_string(),
            address: "10.1.0.4".to_string(),
            internal_port: 8080,
            external_port: Some(32000),
            image_id: Some(3),
            ..Default::default()
        }]))
    }

    async fn body(response: HttpResponse) -> Vec<u8> {
        response.into_body().collect().await.unwrap().to_bytes().to_vec()
    }

    #[tokio::test]
    async fn test_route_ok_sets_source_header() {
        let api = api(healthy());
        let response = api.route(br#"{"app_hostname":"x.com"}"#).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[ROUTE_SOURCE_HEADER], "discovery");
        let route: RouteResponse = serde_json::from_slice(&body(response).await).unwrap();
        assert_eq!(route.target_host, "10.1.0.4");
        assert_eq!(route.target_port, 32000);
        assert_eq!(route.container_id, "c-1");
        assert_eq!(route.image_id, 3);
        assert_eq!(route.ttl, 30);
    }

    #[tokio::test]
    async fn test_route_body_has_only_documented_fields() {
        let api = api(healthy());
        let response = api.route(br#"{"website_url":"https://x.com/"}"#).await;
        assert_eq!(response.status(), StatusCode::OK);

        let value: serde_json::Value = serde_json::from_slice(&body(response).await).unwrap();
        let mut keys: Vec<&str> = value.as_object().unwrap().keys().map(String::as_str).collect();
        keys.sort_unstable();
        assert_eq!(keys, vec!["container_id", "image_id", "target_host", "target_port", "ttl"]);
    }

    #[tokio::test]
    async fn test_unusable_app_hostname_falls_back_to_website_url() {
        let api = api(healthy());
        let response = api
            .route(br#"{"app_hostname":"https://","website_url":"x.com"}"#)
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[ROUTE_SOURCE_HEADER], "discovery");
    }

    #[tokio::test]
    async fn test_route_validation_errors() {
        let api = api(healthy());
        let requests: [&[u8]; 4] = [br#"{}"#, br#"{"app_hostname":"  "}"#, b"not json", b""];
        for request in requests {
            let response = api.route(request).await;
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
            let error: ErrorResponse = serde_json::from_slice(&body(response).await).unwrap();
            assert!(!error.detail.is_empty());
        }
    }

    #[tokio::test]
    async fn test_route_unavailable() {
        let api = api(StaticDiscovery(Err(())));
        let response = api.route(br#"{"app_hostname":"x.com"}"#).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(response.headers().get(ROUTE_SOURCE_HEADER).is_none());
    }

    #[tokio::test]
    async fn test_operational_endpoints() {
        let api = api(healthy());
        api.route(br#"{"app_hostname":"x.com"}"#).await;

        assert_eq!(api.respond(&Method::GET, "/healthz").status(), StatusCode::OK);

        let response = api.respond(&Method::GET, "/fallback/status");
        let status: Vec<serde_json::Value> = serde_json::from_slice(&body(response).await).unwrap();
        assert_eq!(status.len(), 1);
        assert_eq!(status[0]["hostname"], "x.com");

        let response = api.respond(&Method::GET, "/metrics");
        let text = String::from_utf8(body(response).await).unwrap();
        assert!(text.contains("route_requests_total{outcome=\"discovery\"} 1"));

        assert_eq!(api.respond(&Method::GET, "/route").status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(api.respond(&Method::POST, "/healthz").status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(api.respond(&Method::GET, "/nope").status(), StatusCode::NOT_FOUND);
    }
}
