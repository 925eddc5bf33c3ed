use hyper::StatusCode;
use thiserror::Error;

/// Errors surfaced to callers of the routing engine
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RoutingError {
    #[error("{0}")]
    Validation(String),

    #[error("No healthy instances available for {hostname}")]
    NoHealthyInstances { hostname: String },

    #[error("Discovery cache is warming up, retry shortly")]
    CacheNotWarm,
}

impl RoutingError {
    /// HTTP status this error is answered with
    pub fn status_code(&self) -> StatusCode {
        match self {
            RoutingError::Validation(_) => StatusCode::BAD_REQUEST,
            RoutingError::NoHealthyInstances { .. } | RoutingError::CacheNotWarm => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Label used by the request outcome counter
    pub fn outcome(&self) -> &'static str {
        match self {
            RoutingError::Validation(_) => "invalid",
            RoutingError::NoHealthyInstances { .. } => "unavailable",
            RoutingError::CacheNotWarm => "not_warm",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            RoutingError::Validation("app_hostname is required".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        let unavailable = RoutingError::NoHealthyInstances {
            hostname: "x.com".into(),
        };
        assert_eq!(unavailable.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(unavailable.to_string(), "No healthy instances available for x.com");
        assert_eq!(RoutingError::CacheNotWarm.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_ne!(RoutingError::CacheNotWarm.to_string(), unavailable.to_string());
    }
}
