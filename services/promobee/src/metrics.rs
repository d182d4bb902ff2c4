//! Process self-observability
//!
//! Library crates emit through the `metrics` facade; this installs the global
//! Prometheus recorder behind `GET /metrics`:
//!
//! - `promobee_poll_cycles_total` (counter): label `outcome`
//! - `promobee_poll_duration_seconds` (histogram)
//! - `promobee_thermostats_known` (gauge)
//! - `promobee_poll_skipped_records_total` (counter): label `kind`
//! - `promobee_token_refreshes_total` (counter): label `outcome`
//!
//! Per-thermostat expositions never touch this recorder.

use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};

/// Poll cycles are a couple of HTTP round trips; anything past two minutes is
/// a hung request.
const POLL_DURATION_BUCKETS: &[f64] = &[0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0];

fn builder() -> Result<PrometheusBuilder, BuildError> {
    PrometheusBuilder::new().set_buckets_for_metric(
        Matcher::Full("promobee_poll_duration_seconds".to_string()),
        POLL_DURATION_BUCKETS,
    )
}

/// Install the Prometheus recorder and return a handle for rendering metrics.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    builder()?.install_recorder()
}
