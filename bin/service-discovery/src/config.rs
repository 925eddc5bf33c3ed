//! service-discovery configuration
//!
//! Defaults, then the YAML file named by `ROUTER_CONFIG`, then environment
//! overrides.

use anyhow::{bail, Result};
use routing_core::config::{env_var, load_file_or_default, LoggingConfig};
use routing_registry::{RegistryConfig, WatcherConfig};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Address the discovery API listens on
    pub listen_addr: SocketAddr,
    pub registry_url: String,
    pub registry_token: Option<String>,
    /// Timeout for registry calls other than the blocking watch
    pub registry_timeout_secs: u64,
    /// Registry service whose instances are cached
    pub registry_service: String,
    pub watch_wait_secs: u64,
    pub watch_retry_delay_ms: u64,
    pub watch_shutdown_grace_secs: u64,
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8081)),
            registry_url: "http://127.0.0.1:8500".to_string(),
            registry_token: None,
            registry_timeout_secs: 10,
            registry_service: "app".to_string(),
            watch_wait_secs: 60,
            watch_retry_delay_ms: 2000,
            watch_shutdown_grace_secs: 5,
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
        if let Some(addr) = env_var("DISCOVERY_LISTEN_ADDR")? {
            self.listen_addr = addr;
        }
        if let Some(url) = env_var("REGISTRY_URL")? {
            self.registry_url = url;
        }
        if let Some(token) = env_var("REGISTRY_TOKEN")? {
            self.registry_token = Some(token);
        }
        if let Some(secs) = env_var("REGISTRY_TIMEOUT_SECS")? {
            self.registry_timeout_secs = secs;
        }
        if let Some(service) = env_var("REGISTRY_SERVICE")? {
            self.registry_service = service;
        }
        if let Some(secs) = env_var("WATCH_WAIT_SECS")? {
            self.watch_wait_secs = secs;
        }
        if let Some(ms) = env_var("WATCH_RETRY_DELAY_MS")? {
            self.watch_retry_delay_ms = ms;
        }
        if let Some(secs) = env_var("WATCH_SHUTDOWN_GRACE_SECS")? {
            self.watch_shutdown_grace_secs = secs;
        }
        self.logging.apply_env()
    }

    fn validate(&self) -> Result<()> {
        if self.registry_service.trim().is_empty() {
            bail!("registry_service must not be empty");
        }
        if self.watch_wait_secs == 0 {
            bail!("watch_wait_secs must be at least 1");
        }
        Ok(())
    }

    pub fn registry_config(&self) -> RegistryConfig {
        RegistryConfig {
            url: self.registry_url.clone(),
            token: self.registry_token.clone(),
            request_timeout: Duration::from_secs(self.registry_timeout_secs),
        }
    }

    pub fn watcher_config(&self) -> WatcherConfig {
        WatcherConfig {
            service_name: self.registry_service.clone(),
            wait: Duration::from_secs(self.watch_wait_secs),
            retry_delay: Duration::from_millis(self.watch_retry_delay_ms),
            shutdown_grace: Duration::from_secs(self.watch_shutdown_grace_secs),
        }
    }
}
