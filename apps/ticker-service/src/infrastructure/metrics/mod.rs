//! Prometheus Metrics Module
//!
//! Exposes service metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Simulation**: Ticks produced
//! - **Delivery**: Pushes delivered, failures and evictions
//! - **Sessions**: Logins, registered and active sessions
//! - **Latency**: Fan-out duration per tick
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the health server port.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

use crate::domain::RegistryStats;

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// Subsequent calls return the handle installed by the first one.
///
/// # Errors
///
/// Returns an error if the recorder cannot be installed.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    register_metrics();
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!("ticker_ticks_total", "Total simulator ticks");
    describe_counter!(
        "ticker_deliveries_total",
        "Total change events delivered to subscribers"
    );
    describe_counter!(
        "ticker_delivery_failures_total",
        "Total failed deliveries"
    );
    describe_counter!(
        "ticker_evictions_total",
        "Total subscribers evicted after a failed delivery"
    );
    describe_counter!("ticker_logins_total", "Total successful logins");
    describe_counter!(
        "ticker_connections_total",
        "Total accepted duplex connections"
    );

    describe_gauge!("ticker_sessions", "Registered sessions");
    describe_gauge!("ticker_active_subscribers", "Sessions with monitoring on");

    describe_histogram!(
        "ticker_dispatch_seconds",
        "Time to fan one change event out to all active subscribers"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Record a completed simulator tick.
pub fn record_tick() {
    counter!("ticker_ticks_total").increment(1);
}

/// Record the outcome of one fan-out.
pub fn record_dispatch(delivered: u64, failed: u64, duration: Duration) {
    counter!("ticker_deliveries_total").increment(delivered);
    counter!("ticker_delivery_failures_total").increment(failed);
    histogram!("ticker_dispatch_seconds").record(duration.as_secs_f64());
}

/// Record an evicted subscriber.
pub fn record_eviction() {
    counter!("ticker_evictions_total").increment(1);
}

/// Record a successful login.
pub fn record_login() {
    counter!("ticker_logins_total").increment(1);
}

/// Record an accepted duplex connection.
pub fn record_connection() {
    counter!("ticker_connections_total").increment(1);
}

/// Update session gauges.
#[allow(clippy::cast_precision_loss)]
pub fn set_sessions(stats: RegistryStats) {
    gauge!("ticker_sessions").set(stats.sessions as f64);
    gauge!("ticker_active_subscribers").set(stats.active as f64);
}

// =============================================================================
// Tests
// =============================================================================
