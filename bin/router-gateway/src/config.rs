//! router-gateway configuration
//!
//! Defaults, then the YAML file named by `ROUTER_CONFIG`, then environment
//! overrides.

use anyhow::{bail, Result};
use routing_core::config::{env_var, load_file_or_default, LoggingConfig};
use routing_proxy::{CircuitBreakerConfig, FallbackConfig};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Address `POST /route` is served on
    pub listen_addr: SocketAddr,
    /// Base URL of the discovery service
    pub discovery_url: String,
    pub discovery_timeout_ms: u64,
    pub breaker_failure_threshold: u32,
    pub breaker_reset_timeout_secs: u64,
    pub fallback_ttl_secs: u64,
    pub fallback_max_entries: usize,
    /// Advisory `ttl` returned with every routing decision
    pub route_ttl_secs: u64,
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            discovery_url: "http://127.0.0.1:8081".to_string(),
            discovery_timeout_ms: 2000,
            breaker_failure_threshold: 5,
            breaker_reset_timeout_secs: 30,
            fallback_ttl_secs: 300,
            fallback_max_entries: 1024,
            route_ttl_secs: 30,
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let mut config: Config = load_file_or_default()?;
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self) -> routing_core::Result<()> {
        if let Some(addr) = env_var("GATEWAY_LISTEN_ADDR")? {
            self.listen_addr = addr;
        }
        if let Some(url) = env_var("DISCOVERY_URL")? {
            self.discovery_url = url;
        }
        if let Some(ms) = env_var("DISCOVERY_TIMEOUT_MS")? {
            self.discovery_timeout_ms = ms;
        }
        if let Some(threshold) = env_var("BREAKER_FAILURE_THRESHOLD")? {
            self.breaker_failure_threshold = threshold;
        }
        if let Some(secs) = env_var("BREAKER_RESET_TIMEOUT_SECS")? {
            self.breaker_reset_timeout_secs = secs;
        }
        if let Some(secs) = env_var("FALLBACK_TTL_SECS")? {
            self.fallback_ttl_secs = secs;
        }
        if let Some(entries) = env_var("FALLBACK_MAX_ENTRIES")? {
            self.fallback_max_entries = entries;
        }
        if let Some(secs) = env_var("ROUTE_TTL_SECS")? {
            self.route_ttl_secs = secs;
        }
        self.logging.apply_env()
    }

    fn validate(&self) -> Result<()> {
        if self.breaker_failure_threshold == 0 {
            bail!("breaker_failure_threshold must be at least 1");
        }
        if self.fallback_max_entries == 0 {
            bail!("fallback_max_entries must be at least 1");
        }
        if self.discovery_timeout_ms == 0 {
            bail!("discovery_timeout_ms must be at least 1");
        }
        Ok(())
    }

    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_millis(self.discovery_timeout_ms)
    }

    pub fn breaker_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.breaker_failure_threshold,
            reset_timeout: Duration::from_secs(self.breaker_reset_timeout_secs),
        }
    }

    pub fn fallback_config(&self) -> FallbackConfig {
        FallbackConfig {
            ttl: Duration::from_secs(self.fallback_ttl_secs),
            max_entries: self.fallback_max_entries,
        }
    }

    pub fn route_ttl(&self) -> Duration {
        Duration::from_secs(self.route_ttl_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.listen_addr.port(), 8080);
        assert_eq!(config.breaker_config().failure_threshold, 5);
        assert_eq!(config.breaker_config().reset_timeout, Duration::from_secs(30));
        assert_eq!(config.fallback_config().ttl, Duration::from_secs(300));
        assert_eq!(config.route_ttl(), Duration::from_secs(30));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_yaml_overrides_some_fields() {
        let config: Config =
            serde_yaml::from_str("discovery_url: http://discovery:8081\nfallback_ttl_secs: 60\n").unwrap();
        assert_eq!(config.discovery_url, "http://discovery:8081");
        assert_eq!(config.fallback_config().ttl, Duration::from_secs(60));
        assert_eq!(config.fallback_config().max_entries, 1024);
    }

    // Environment variables are process-wide, so every env case lives in this one test
    #[test]
    fn test_env_overrides() {
        std::env::set_var("GATEWAY_LISTEN_ADDR", "127.0.0.1:9090");
        std::env::set_var("BREAKER_FAILURE_THRESHOLD", "2");
        let mut config = Config::default();
        config.apply_env().unwrap();
        assert_eq!(config.listen_addr.port(), 9090);
        assert_eq!(config.breaker_config().failure_threshold, 2);

        std::env::set_var("BREAKER_FAILURE_THRESHOLD", "-1");
        assert!(Config::default().apply_env().is_err());

        std::env::set_var("BREAKER_FAILURE_THRESHOLD", "0");
        let mut config = Config::default();
        config.apply_env().unwrap();
        assert!(config.validate().is_err());

        for name in ["GATEWAY_LISTEN_ADDR", "BREAKER_FAILURE_THRESHOLD"] {
            std::env::remove_var(name);
        }
    }
}
