use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// ServiceInstance is one healthy candidate for serving a logical service.
///
/// Instances are rebuilt from registry data on every watch cycle and never
/// mutated afterwards.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceInstance {
    /// Registry-assigned instance id (unique)
    pub instance_id: String,

    /// Internal network address
    pub address: String,

    /// Port the instance listens on inside the network
    pub internal_port: u16,

    /// Port reachable from the routing tier, if published
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_port: Option<u16>,

    /// Aggregate health status as reported by the registry checks
    pub health_status: String,

    /// Raw registry tags
    #[serde(default)]
    pub tags: Vec<String>,

    /// Logical service (image) identifier decoded from the tags
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_id: Option<i64>,

    /// External hostname decoded from the tags, case preserved
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub routable_hostname: Option<String>,

    /// Owning account, from the registration metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,

    /// When this instance was observed in the registry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_at: Option<DateTime<Utc>>,
}

impl ServiceInstance {
    /// Port to route to: the external port when published, the internal one otherwise
    pub fn target_port(&self) -> u16 {
        self.external_port.unwrap_or(self.internal_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_port_prefers_external() {
        let mut instance = ServiceInstance {
            internal_port: 8080,
            ..Default::default()
        };
        assert_eq!(instance.target_port(), 8080);

        instance.external_port = Some(32000);
        assert_eq!(instance.target_port(), 32000);
    }

    #[test]
    fn test_optional_fields_omitted() {
        let instance = ServiceInstance {
            instance_id: "c1".to_string(),
            address: "10.0.0.1".to_string(),
            internal_port: 80,
            health_status: "passing".to_string(),
            ..Default::default()
        };
        let json = serde_json::to_value(&instance).unwrap();
        assert!(json.get("external_port").is_none());
        assert!(json.get("image_id").is_none());
        assert_eq!(json["tags"], serde_json::json!([]));
    }
}
