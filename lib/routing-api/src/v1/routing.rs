use serde::{Deserialize, Serialize};

/// Body of `POST /route`
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RouteRequest {
    /// Routable hostname of the target application
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_hostname: Option<String>,

    /// Legacy name for `app_hostname`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website_url: Option<String>,
}

impl RouteRequest {
    /// Candidate hostnames in order of preference, `app_hostname` first.
    /// Blank values are skipped.
    pub fn hostnames(&self) -> impl Iterator<Item = &str> {
        [self.app_hostname.as_deref(), self.website_url.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|h| !h.is_empty())
    }

    /// The first candidate accepted by `usable`
    pub fn hostname<F>(&self, usable: F) -> Option<&str>
    where
        F: Fn(&str) -> bool,
    {
        self.hostnames().find(|h| usable(h))
    }
}

/// Successful routing decision
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RouteResponse {
    pub target_host: String,
    pub target_port: u16,
    pub container_id: String,
    pub image_id: i64,
    /// Seconds the caller may reuse this decision before re-resolving
    pub ttl: u64,
}

/// Error body for 4xx/5xx answers
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub detail: String,
}

impl ErrorResponse {
    pub fn new(detail: impl Into<String>) -> Self {
        Self { detail: detail.into() }
    }
}
