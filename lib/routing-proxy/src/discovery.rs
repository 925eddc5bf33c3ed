//! Client for the discovery service's healthy-instance listing

use async_trait::async_trait;
use reqwest::StatusCode;
use routing_api::v1::NOT_WARM_DETAIL;
use routing_api::{ErrorResponse, HealthyServicesResponse, ServiceInstance};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("Discovery request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Discovery returned HTTP {status}")]
    UnexpectedStatus { status: u16 },

    #[error("Discovery cache is not warm yet")]
    NotWarm,

    #[error("Invalid discovery configuration: {0}")]
    InvalidConfiguration(String),
}

/// Source of healthy instances for a hostname
#[async_trait]
pub trait DiscoveryClient: Send + Sync {
    /// Healthy instances currently serving `hostname`; empty when unknown
    async fn healthy_instances(&self, hostname: &str) -> Result<Vec<ServiceInstance>, DiscoveryError>;
}

/// DiscoveryClient over the discovery service's HTTP API
#[derive(Clone, Debug)]
pub struct HttpDiscoveryClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpDiscoveryClient {
    /// Create a client for the service at `base_url`; every call is bounded by `timeout`
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, DiscoveryError> {
        let base_url = base_url.trim_end_matches('/').to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(DiscoveryError::InvalidConfiguration(format!(
                "discovery url must start with http:// or https://: {}",
                base_url
            )));
        }

        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl DiscoveryClient for HttpDiscoveryClient {
    async fn healthy_instances(&self, hostname: &str) -> Result<Vec<ServiceInstance>, DiscoveryError> {
        let response = self
            .http
            .get(format!("{}/services/healthy", self.base_url))
            .query(&[("app_hostname", hostname)])
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::SERVICE_UNAVAILABLE {
            // Only the discovery service's own cold-cache answer means "not warm";
            // a 503 from anything in between is an ordinary failure
            let body = response.bytes().await?;
            return match serde_json::from_slice::<ErrorResponse>(&body) {
                Ok(error) if error.detail == NOT_WARM_DETAIL => Err(DiscoveryError::NotWarm),
                _ => Err(DiscoveryError::UnexpectedStatus {
                    status: status.as_u16(),
                }),
            };
        }
        if !status.is_success() {
            return Err(DiscoveryError::UnexpectedStatus {
                status: status.as_u16(),
            });
        }

        let listing: HealthyServicesResponse = response.json().await?;
        debug!(hostname, count = listing.count, "Discovery answered");
        Ok(listing.services)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use routing_core::ServiceCache;
    use routing_registry::DiscoveryApi;
    use std::sync::Arc;
    use tokio::net::TcpListener;
    use tokio::sync::watch;

    fn instance(id: &str, hostname: &str) -> ServiceInstance {
        ServiceInstance {
            instance_id: id.to_string(),
            address: "10.0.0.5".to_string(),
            internal_port: 8080,
            external_port: Some(32000),
            health_status: "passing".to_string(),
            image_id: Some(9),
            routable_hostname: Some(hostname.to_string()),
            ..Default::default()
        }
    }

    async fn start(cache: Arc<ServiceCache>) -> (String, watch::Sender<bool>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let api = Arc::new(DiscoveryApi::new(cache, None));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(routing_core::server::serve(
            listener,
            move |req| api.clone().handle(req),
            shutdown_rx,
        ));
        (format!("http://{}", addr), shutdown_tx)
    }

    #[tokio::test]
    async fn test_not_warm_maps_to_error() {
        let (url, _shutdown) = start(Arc::new(ServiceCache::new())).await;
        let client = HttpDiscoveryClient::new(&url, Duration::from_secs(2)).unwrap();

        let err = client.healthy_instances("x.com").await.unwrap_err();
        assert!(matches!(err, DiscoveryError::NotWarm));
    }

    #[tokio::test]
    async fn test_other_unavailable_is_not_cold_cache() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (_shutdown, shutdown_rx) = watch::channel(false);
        tokio::spawn(routing_core::server::serve(
            listener,
            |_req| async {
                Ok::<_, hyper::Error>(routing_core::server::json_response(
                    hyper::StatusCode::SERVICE_UNAVAILABLE,
                    &ErrorResponse::new("upstream is shutting down"),
                ))
            },
            shutdown_rx,
        ));

        let client = HttpDiscoveryClient::new(&format!("http://{}", addr), Duration::from_secs(2)).unwrap();
        let err = client.healthy_instances("x.com").await.unwrap_err();
        assert!(matches!(err, DiscoveryError::UnexpectedStatus { status: 503 }));
    }

    #[tokio::test]
    async fn test_lists_instances_by_hostname() {
        let cache = Arc::new(ServiceCache::new());
        cache.update(vec![instance("c-1", "x.com"), instance("c-2", "x.com")], 4);
        let (url, _shutdown) = start(cache).await;
        let client = HttpDiscoveryClient::new(&format!("{}/", url), Duration::from_secs(2)).unwrap();

        let instances = client.healthy_instances("X.com").await.unwrap();
        assert_eq!(instances.len(), 2);
        assert_eq!(instances[0].target_port(), 32000);

        assert!(client.healthy_instances("other.com").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_is_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = HttpDiscoveryClient::new(&format!("http://{}", addr), Duration::from_millis(500)).unwrap();
        let err = client.healthy_instances("x.com").await.unwrap_err();
        assert!(matches!(err, DiscoveryError::Transport(_)));
    }

    #[test]
    fn test_rejects_url_without_scheme() {
        let err = HttpDiscoveryClient::new("discovery:8081", Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, DiscoveryError::InvalidConfiguration(_)));
    }
}
