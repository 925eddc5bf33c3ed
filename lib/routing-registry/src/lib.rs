//! Registry integration
//!
//! Typed access to the external service registry, the long-poll watcher that
//! keeps a [`routing_core::ServiceCache`] in sync with it, and the HTTP API the
//! discovery service exposes over that cache.

pub mod client;
pub mod error;
pub mod metrics;
pub mod server;
pub mod watcher;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use client::{parse_health_entries, RegistryClient, RegistryConfig, WatchResponse};
pub use error::{RegistryError, Result};
pub use metrics::WatcherMetrics;
pub use server::DiscoveryApi;
pub use watcher::{RegistryWatcher, WatcherConfig, WatcherHandle};
