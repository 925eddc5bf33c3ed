//! HTTP client for the external service registry

use crate::{RegistryError, Result};
use chrono::{DateTime, Utc};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use routing_api::v1::{INDEX_HEADER, STATUS_PASSING, TOKEN_HEADER};
use routing_api::{HealthEntry, ServiceInstance, ServiceRegistration};
use routing_core::decode_tags;
use std::time::Duration;
use tracing::debug;

/// Extra client-side time on top of the server-side hold of a blocking query
pub const WATCH_TIMEOUT_MARGIN: Duration = Duration::from_secs(5);

/// Registration metadata key carrying the owning account
const OWNER_META_KEY: &str = "owner_id";

/// Registry connection settings
#[derive(Clone, Debug, PartialEq)]
pub struct RegistryConfig {
    /// Base URL, e.g. `http://127.0.0.1:8500`
    pub url: String,
    /// ACL token sent with every request
    pub token: Option<String>,
    /// Timeout for non-blocking calls
    pub request_timeout: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8500".to_string(),
            token: None,
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// Result of one blocking health query
#[derive(Clone, Debug)]
pub enum WatchResponse {
    /// The registry answered with the current entries and a new index
    Changed { entries: Vec<HealthEntry>, index: u64 },
    /// The service has no registrations at all
    NotFound { index: Option<u64> },
}

/// RegistryClient wraps the registry's HTTP API
#[derive(Clone, Debug)]
pub struct RegistryClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
    request_timeout: Duration,
}

impl RegistryClient {
    /// Create a new registry client
    pub fn new(config: &RegistryConfig) -> Result<Self> {
        let base_url = config.url.trim_end_matches('/').to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(RegistryError::InvalidConfiguration(format!(
                "registry url must start with http:// or https://: {}",
                config.url
            )));
        }

        // Per-request timeouts are set on each call; blocking queries need a
        // longer one than everything else.
        let http = reqwest::Client::builder().build()?;

        Ok(Self {
            http,
            base_url,
            token: config.token.clone(),
            request_timeout: config.request_timeout,
        })
    }

    /// Base URL of the registry
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let mut request = self.http.request(method, format!("{}{}", self.base_url, path));
        if let Some(token) = &self.token {
            request = request.header(TOKEN_HEADER, token);
        }
        request
    }

    /// Register a service instance with the local agent
    pub async fn register(&self, registration: &ServiceRegistration) -> Result<()> {
        let response = self
            .request(Method::PUT, "/v1/agent/service/register")
            .timeout(self.request_timeout)
            .json(registration)
            .send()
            .await?;
        expect_success(response).await?;

        debug!(instance_id = %registration.id, service = %registration.name, "Registered instance");
        Ok(())
    }

    /// Remove a service instance from the local agent
    pub async fn deregister(&self, instance_id: &str) -> Result<()> {
        let response = self
            .request(Method::PUT, &format!("/v1/agent/service/deregister/{}", instance_id))
            .timeout(self.request_timeout)
            .send()
            .await?;
        expect_success(response).await?;

        debug!(instance_id, "Deregistered instance");
        Ok(())
    }

    /// List the healthy instances of a service without blocking
    pub async fn healthy_instances(&self, service: &str) -> Result<Vec<ServiceInstance>> {
        let response = self
            .request(Method::GET, &format!("/v1/health/service/{}", service))
            .query(&[("passing", "true")])
            .timeout(self.request_timeout)
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        let response = expect_success(response).await?;
        let entries: Vec<HealthEntry> = serde_json::from_slice(&response.bytes().await?)?;
        Ok(parse_health_entries(entries, Utc::now()))
    }

    /// Blocking query: wait up to `wait` for the service's health listing to
    /// change past `index`.
    ///
    /// The client-side timeout is always longer than `wait`, so a quiet
    /// registry answers before the request times out locally.
    pub async fn watch(&self, service: &str, index: u64, wait: Duration) -> Result<WatchResponse> {
        let response = self
            .request(Method::GET, &format!("/v1/health/service/{}", service))
            .query(&[("index", index.to_string()), ("wait", format_wait(wait))])
            .timeout(wait + WATCH_TIMEOUT_MARGIN)
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            let index = read_index(&response).ok();
            return Ok(WatchResponse::NotFound { index });
        }

        let response = expect_success(response).await?;
        let index = read_index(&response)?;
        let entries: Vec<HealthEntry> = serde_json::from_slice(&response.bytes().await?)?;
        Ok(WatchResponse::Changed { entries, index })
    }
}

/// Turn a health listing into instances.
///
/// An entry is kept only when every one of its checks reports `passing`;
/// metadata comes from the tag codec and unparsable tags just leave fields
/// unset.
pub fn parse_health_entries(entries: Vec<HealthEntry>, observed_at: DateTime<Utc>) -> Vec<ServiceInstance> {
    entries
        .into_iter()
        .filter(|entry| {
            let healthy = entry.checks.iter().all(|check| check.status == STATUS_PASSING);
            if !healthy {
                debug!(instance_id = %entry.service.id, "Dropping instance with failing checks");
            }
            healthy
        })
        .map(|entry| {
            let metadata = decode_tags(&entry.service.tags);
            let address = entry.address().to_string();
            let owner_id = entry.service.meta.get(OWNER_META_KEY).cloned();
            ServiceInstance {
                instance_id: entry.service.id,
                address,
                internal_port: entry.service.port,
                external_port: metadata.external_port,
                health_status: STATUS_PASSING.to_string(),
                tags: entry.service.tags,
                image_id: metadata.image_id,
                routable_hostname: metadata.routable_hostname,
                owner_id,
                observed_at: Some(observed_at),
            }
        })
        .collect()
}

/// Format a hold time the way the registry's `wait` parameter expects
pub fn format_wait(wait: Duration) -> String {
    if wait.subsec_millis() == 0 && wait.as_secs() > 0 {
        format!("{}s", wait.as_secs())
    } else {
        format!("{}ms", wait.as_millis())
    }
}

fn read_index(response: &Response) -> Result<u64> {
    let value = response
        .headers()
        .get(INDEX_HEADER)
        .ok_or_else(|| RegistryError::InvalidIndex("missing".to_string()))?;
    let value = value
        .to_str()
        .map_err(|_| RegistryError::InvalidIndex("not ASCII".to_string()))?;
    value
        .trim()
        .parse()
        .map_err(|_| RegistryError::InvalidIndex(value.to_string()))
}

async fn expect_success(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(RegistryError::UnexpectedStatus {
        status: status.as_u16(),
        body,
    })
}
