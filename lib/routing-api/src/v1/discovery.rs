use crate::v1::ServiceInstance;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Body of `GET /services/healthy`
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct HealthyServicesResponse {
    pub services: Vec<ServiceInstance>,
    pub count: usize,
    pub filters: ServiceFilters,
}

/// Filters echoed back by the healthy-instance listing
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceFilters {
    #[serde(default)]
    pub image_id: Option<i64>,
    #[serde(default)]
    pub app_hostname: Option<String>,
}

/// Body of `GET /services/cache/status`
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStatus {
    /// Registry index of the last applied watch cycle
    pub last_index: u64,

    /// When the last watch cycle was applied; absent until the cache is warm
    pub last_updated_at: Option<DateTime<Utc>>,

    /// Instance count per image id
    pub images: BTreeMap<i64, usize>,

    pub total_instances: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_status_roundtrips_integer_keys() {
        let mut images = BTreeMap::new();
        images.insert(1, 2);
        images.insert(7, 1);
        let status = CacheStatus {
            last_index: 9,
            last_updated_at: None,
            images,
            total_instances: 3,
        };

        let json = serde_json::to_string(&status).unwrap();
        assert!(json.contains(r#""1":2"#));
        let decoded: CacheStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, status);
    }
}
