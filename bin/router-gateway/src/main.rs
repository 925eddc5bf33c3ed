use anyhow::Result;
use routing_core::logging;
use routing_core::server::serve;
use routing_proxy::{
    CircuitBreaker, FallbackCache, GatewayApi, HttpDiscoveryClient, RoundRobinSelector, RoutingEngine, RoutingMetrics,
};
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
        discovery = %config.discovery_url,
        "Starting router-gateway"
    );

    let discovery = HttpDiscoveryClient::new(&config.discovery_url, config.discovery_timeout())?;
    let breaker = Arc::new(CircuitBreaker::new(config.breaker_config()));
    let fallback = Arc::new(FallbackCache::new(config.fallback_config()));
    let selector = Arc::new(RoundRobinSelector::new());
    let metrics = RoutingMetrics::new()?;
    info!(
        failure_threshold = config.breaker_failure_threshold,
        reset_timeout_secs = config.breaker_reset_timeout_secs,
        fallback_ttl_secs = config.fallback_ttl_secs,
        "Routing engine initialized"
    );

    let engine = RoutingEngine::new(Arc::new(discovery), breaker, fallback, selector, config.route_ttl())
        .with_metrics(metrics);
    let api = Arc::new(GatewayApi::new(Arc::new(engine)));

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
    match exited {
        Some(result) => {
            error!("HTTP server exited unexpectedly");
            result??;
        }
        None => server.await??,
    }

    info!("router-gateway stopped");
    Ok(())
}
