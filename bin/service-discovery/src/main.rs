use anyhow::Result;
use routing_core::server::serve;
use routing_core::{logging, ServiceCache};
use routing_registry::{DiscoveryApi, RegistryClient, RegistryWatcher, WatcherMetrics};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};

mod config;

use config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;
    logging::init(&config.logging);

    info!(
        listen_addr = %config.listen_addr,
        registry = %config.registry_url,
        service = %config.registry_service,
        "Starting service-discovery"
    );

    let cache = Arc::new(ServiceCache::new());
    let metrics = WatcherMetrics::new()?;

    let client = RegistryClient::new(&config.registry_config())?;
    let watcher = RegistryWatcher::new(client, cache.clone(), config.watcher_config())
        .with_metrics(metrics.clone())
        .spawn();

    let api = Arc::new(DiscoveryApi::new(cache, Some(metrics)));
    let listener = TcpListener::bind(config.listen_addr).await?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut server = tokio::spawn(serve(listener, move |req| api.clone().handle(req), shutdown_rx));

    let exited = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal?;
            info!("Shutdown signal received");
            None
        }
        result = &mut server => Some(result),
    };

    let _ = shutdown_tx.send(true);
    watcher.stop().await;
    match exited {
        Some(result) => {
            error!("HTTP server exited unexpectedly");
            result??;
        }
        None => server.await??,
    }

    info!("service-discovery stopped");
    Ok(())
}
