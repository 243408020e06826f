//! Optional Metrics Exporter (spec §4.7): a Prometheus `/metrics` endpoint
//! exposed via the `metrics` facade crate, gated behind
//! [`crate::ENV_PROMETHEUS`] and the `metrics` Cargo feature.
//!
//! When disabled, no recorder is installed and no port is opened — every
//! call to the `metrics::*!` macros elsewhere in the crate becomes a no-op,
//! which is how the `metrics` facade behaves without an installed recorder.

use std::net::SocketAddr;
use std::time::Instant;

/// Installs the Prometheus recorder and starts its HTTP listener at `addr`,
/// if [`crate::ENV_PROMETHEUS`] is set to `1`. Returns `true` if installed.
///
/// # Panics
///
/// Panics if the recorder cannot be installed (e.g. the port is already in
/// use) — this only runs once at startup, so a hard failure here is
/// appropriate rather than silently disabling metrics the operator asked
/// for.
#[cfg(feature = "metrics")]
pub fn install(addr: SocketAddr) -> bool {
    if std::env::var(crate::ENV_PROMETHEUS).as_deref() != Ok("1") {
        return false;
    }
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .expect("failed to install the Prometheus metrics recorder");
    tracing::info!(%addr, "Prometheus metrics exporter listening");
    true
}

#[cfg(not(feature = "metrics"))]
pub fn install(_addr: SocketAddr) -> bool {
    false
}

/// Records one completed check: increments `gnm_checks_total{type,status}`
/// and observes `gnm_check_duration_seconds{type}`. A no-op when the
/// `metrics` feature is disabled.
#[cfg(feature = "metrics")]
pub fn record_check(check_type: &str, status: &str, duration_secs: f64) {
    metrics::counter!("gnm_checks_total", "type" => check_type.to_string(), "status" => status.to_string())
        .increment(1);
    metrics::histogram!("gnm_check_duration_seconds", "type" => check_type.to_string())
        .record(duration_secs);
}

#[cfg(not(feature = "metrics"))]
pub fn record_check(_check_type: &str, _status: &str, _duration_secs: f64) {}

/// Observes `gnm_cycle_duration_seconds` for one completed collection cycle.
#[cfg(feature = "metrics")]
pub fn record_cycle(duration_secs: f64) {
    metrics::histogram!("gnm_cycle_duration_seconds").record(duration_secs);
}

#[cfg(not(feature = "metrics"))]
pub fn record_cycle(_duration_secs: f64) {}

/// Updates the `gnm_uptime_seconds` gauge from `started_at`. Called once per
/// cycle by the scheduler.
#[cfg(feature = "metrics")]
pub fn record_uptime(started_at: Instant) {
    metrics::gauge!("gnm_uptime_seconds").set(started_at.elapsed().as_secs_f64());
}

#[cfg(not(feature = "metrics"))]
pub fn record_uptime(_started_at: Instant) {}
