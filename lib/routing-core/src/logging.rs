//! Logging bootstrap for the binaries

use crate::config::LoggingConfig;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over the configured level. JSON output is meant for
/// production log shipping, compact output for local runs.
pub fn init(config: &LoggingConfig) {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    if config.json {
        let fmt_layer = fmt::layer()
            .json()
            .with_target(true)
            .with_current_span(true)
            .with_filter(env_filter);
        tracing_subscriber::registry().with(fmt_layer).init();
    } else {
        let fmt_layer = fmt::layer().compact().with_target(true).with_filter(env_filter);
        tracing_subscriber::registry().with(fmt_layer).init();
    }
}
