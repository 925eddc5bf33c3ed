use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One entry of the registry's health listing
/// (`GET /v1/health/service/{name}`)
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct HealthEntry {
    /// Node the service is registered on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node: Option<Node>,

    /// The registered service instance
    pub service: AgentService,

    /// Health check results attached to the instance and its node
    #[serde(default)]
    pub checks: Vec<HealthCheck>,
}

/// Registry node
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Node {
    #[serde(default)]
    pub node: String,

    #[serde(default)]
    pub address: String,
}

/// Service section of a health entry
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AgentService {
    #[serde(rename = "ID")]
    pub id: String,

    /// Service name the instance is registered under
    #[serde(default)]
    pub service: String,

    /// Service address; empty means "use the node address"
    #[serde(default)]
    pub address: String,

    #[serde(default)]
    pub port: u16,

    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default)]
    pub meta: HashMap<String, String>,
}

/// Result of one health check
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct HealthCheck {
    #[serde(rename = "CheckID", default)]
    pub check_id: String,

    #[serde(default)]
    pub name: String,

    /// "passing", "warning" or "critical"
    pub status: String,
}

/// Body of `PUT /v1/agent/service/register`
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServiceRegistration {
    #[serde(rename = "ID")]
    pub id: String,

    pub name: String,

    pub address: String,

    pub port: u16,

    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub meta: HashMap<String, String>,
}

impl HealthEntry {
    /// Address to reach the instance on, falling back to the node address
    pub fn address(&self) -> &str {
        if !self.service.address.is_empty() {
            return &self.service.address;
        }
        self.node.as_ref().map(|n| n.address.as_str()).unwrap_or("")
    }
}
