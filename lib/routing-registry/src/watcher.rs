//! Registry watcher: keeps a service cache in sync through blocking queries
//!
//! One poll at a time, strictly sequential: every answer is applied to the
//! cache before the next query is issued. A failed poll leaves both the cache
//! and the cursor untouched and is retried after a jittered delay.
//!
//! An index lower than the cursor means the registry lost its state (restart
//! or snapshot restore). The answer is still applied, the cursor restarts
//! from 0 and the cache keeps publishing its previous, higher index. An index
//! of 0 is never used as a cursor since it would not block.

use crate::client::{parse_health_entries, RegistryClient, WatchResponse};
use crate::metrics::WatcherMetrics;
use crate::Result;
use chrono::Utc;
use rand::Rng;
use routing_core::ServiceCache;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Watcher settings
#[derive(Clone, Debug, PartialEq)]
pub struct WatcherConfig {
    /// Registry service name whose instances are cached
    pub service_name: String,
    /// Server-side hold time of each blocking query
    pub wait: Duration,
    /// Pause after a failed poll, before jitter
    pub retry_delay: Duration,
    /// How long `stop()` waits for the loop before aborting it
    pub shutdown_grace: Duration,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            service_name: "app".to_string(),
            wait: Duration::from_secs(60),
            retry_delay: Duration::from_secs(2),
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

/// What a successful poll did to the cache
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PollOutcome {
    /// The registry listed the service; `instances` healthy ones were stored
    Updated { instances: usize, index: u64 },
    /// The service has no registrations; the cache was emptied
    NotFound { index: u64 },
}

/// RegistryWatcher drives a [`ServiceCache`] from the registry
pub struct RegistryWatcher {
    client: RegistryClient,
    cache: Arc<ServiceCache>,
    config: WatcherConfig,
    index: u64,
    metrics: Option<WatcherMetrics>,
}

/// Handle to a spawned watcher loop
pub struct WatcherHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
    grace: Duration,
}

impl RegistryWatcher {
    /// Create a new watcher; nothing runs until [`run`](Self::run) or [`spawn`](Self::spawn)
    pub fn new(client: RegistryClient, cache: Arc<ServiceCache>, config: WatcherConfig) -> Self {
        Self {
            client,
            cache,
            config,
            index: 0,
            metrics: None,
        }
    }

    /// Record poll results in `metrics`
    pub fn with_metrics(mut self, metrics: WatcherMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Registry index the next poll resumes from
    pub fn index(&self) -> u64 {
        self.index
    }

    /// Issue one blocking query and apply its answer to the cache
    pub async fn poll_once(&mut self) -> Result<PollOutcome> {
        let response = self.fetch().await?;
        Ok(self.apply(response))
    }

    async fn fetch(&self) -> Result<WatchResponse> {
        self.client
            .watch(&self.config.service_name, self.index, self.config.wait)
            .await
    }

    fn advance(&mut self, index: u64) {
        self.index = if index < self.index {
            warn!(
                service = %self.config.service_name,
                previous = self.index,
                index,
                "Registry index went backwards, restarting the watch"
            );
            0
        } else {
            index.max(1)
        };
    }

    fn apply(&mut self, response: WatchResponse) -> PollOutcome {
        match response {
            WatchResponse::Changed { entries, index } => {
                let received = entries.len();
                let instances = parse_health_entries(entries, Utc::now());
                let stored = self.cache.update(instances, index);
                self.advance(index);
                let index = self.cache.last_index();

                debug!(
                    service = %self.config.service_name,
                    index,
                    received,
                    stored,
                    "Applied registry update"
                );
                if let Some(metrics) = &self.metrics {
                    metrics.record_update("changed", index, stored);
                }
                PollOutcome::Updated { instances: stored, index }
            }
            WatchResponse::NotFound { index } => {
                let index = index.unwrap_or(self.index);
                self.cache.update(Vec::new(), index);
                self.advance(index);
                let index = self.cache.last_index();

                debug!(service = %self.config.service_name, index, "Service has no registrations");
                if let Some(metrics) = &self.metrics {
                    metrics.record_update("not_found", index, 0);
                }
                PollOutcome::NotFound { index }
            }
        }
    }

    fn retry_delay(&self) -> Duration {
        let base = self.config.retry_delay;
        let max_jitter = base.as_millis() as u64 / 5;
        if max_jitter == 0 {
            return base;
        }
        base + Duration::from_millis(rand::thread_rng().gen_range(0..=max_jitter))
    }

    /// Run the watch loop until `shutdown` becomes true or its sender is dropped.
    ///
    /// An in-flight query is abandoned on shutdown and its answer is never applied.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            service = %self.config.service_name,
            registry = %self.client.base_url(),
            wait_secs = self.config.wait.as_secs(),
            "Registry watcher started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            let response = tokio::select! {
                response = self.fetch() => response,
                _ = shutdown.changed() => break,
            };

            if *shutdown.borrow() {
                break;
            }

            match response {
                Ok(response) => {
                    self.apply(response);
                }
                Err(e) => {
                    if let Some(metrics) = &self.metrics {
                        metrics.record_error();
                    }
                    let delay = self.retry_delay();
                    warn!(
                        service = %self.config.service_name,
                        index = self.index,
                        error = %e,
                        retry_in_ms = delay.as_millis() as u64,
                        "Registry poll failed"
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = shutdown.changed() => break,
                    }
                }
            }
        }

        info!(service = %self.config.service_name, index = self.index, "Registry watcher stopped");
    }

    /// Spawn the watch loop onto the runtime
    pub fn spawn(self) -> WatcherHandle {
        let grace = self.config.shutdown_grace;
        let (shutdown, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(self.run(shutdown_rx));
        WatcherHandle { shutdown, task, grace }
    }
}

impl WatcherHandle {
    /// Signal the loop to stop and wait for it, aborting it after the grace period
    pub async fn stop(mut self) {
        let _ = self.shutdown.send(true);
        match tokio::time::timeout(self.grace, &mut self.task).await {
            Ok(_) => debug!("Registry watcher joined"),
            Err(_) => {
                warn!(grace_secs = self.grace.as_secs(), "Registry watcher did not stop in time, aborting");
                self.task.abort();
            }
        }
    }
}
