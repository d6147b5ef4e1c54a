// packages/engine/src/observability/mod.rs
//! Logging and metrics setup
//!
//! Tracing goes to stdout, filtered through `RUST_LOG` (default `info`).
//! Set `NETTAP_LOG_FORMAT=json` for one JSON object per line.
//!
//! Metrics are recorded through the `metrics` facade. A Prometheus scrape
//! endpoint is only started when `NETTAP_METRICS_ADDR` is set; otherwise the
//! macros are no-ops.

use crate::utils::errors::{EngineError, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Exchanges completed with a response
pub const METRIC_CAPTURED: &str = "nettap_exchanges_captured_total";

/// Exchanges ended by a transport error, body error or timeout
pub const METRIC_FAILED: &str = "nettap_exchanges_failed_total";

/// Requests the admission filter let through without capture, by reason
pub const METRIC_BYPASSED: &str = "nettap_requests_bypassed_total";

/// Issue-to-completion time of captured exchanges
pub const METRIC_DURATION: &str = "nettap_exchange_duration_seconds";

/// Install the global tracing subscriber
pub fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("NETTAP_LOG_FORMAT")
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    let installed = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    installed.map_err(|e| EngineError::ConfigError(format!("Failed to install tracing subscriber: {}", e)))
}

/// Start the Prometheus exporter if `NETTAP_METRICS_ADDR` is set
pub fn init_metrics() -> Result<()> {
    let Ok(addr) = std::env::var("NETTAP_METRICS_ADDR") else {
        return Ok(());
    };

    let addr: SocketAddr = addr
        .parse()
        .map_err(|e| EngineError::ConfigError(format!("Invalid metrics address {}: {}", addr, e)))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| EngineError::ConfigError(format!("Failed to start metrics exporter: {}", e)))?;

    describe_metrics();
    info!("Metrics exporter listening on {}", addr);
    Ok(())
}

fn describe_metrics() {
    metrics::describe_counter!(METRIC_CAPTURED, "Exchanges completed with a response");
    metrics::describe_counter!(METRIC_FAILED, "Exchanges that ended without a response");
    metrics::describe_counter!(METRIC_BYPASSED, "Requests passed through without capture");
    metrics::describe_histogram!(
        METRIC_DURATION,
        metrics::Unit::Seconds,
        "Time from issue to completion of captured exchanges"
    );
}
